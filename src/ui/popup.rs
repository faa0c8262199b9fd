/// Popup UI for Transcript Lens
use std::cell::Cell;
use std::rc::Rc;

use patternfly_yew::prelude::*;
use wasm_bindgen_futures::spawn_local;
use web_sys::HtmlInputElement;
use yew::prelude::*;

use crate::api::is_valid_credential_format;
use crate::bridge::{browser_coordinator, download, get_active_tab, BrowserCoordinator};
use crate::clock::{BrowserClock, Clock};
use crate::export::{export_tab, ExportFormat};
use crate::tab_state::{PanelStatus, TabState};

const NOTICE_POLL_MS: u32 = 500;

#[derive(Clone, Copy, PartialEq)]
enum Action {
    Extract,
    KeyPoints,
    Article,
}

#[derive(Clone, PartialEq)]
enum AppState {
    Loading,
    Idle,
    Busy(String),
    Error(String),
}

#[derive(Clone, PartialEq)]
enum KeyCheck {
    Unchecked,
    Saved,
    Valid,
    Invalid(String),
}

async fn perform(coordinator: Rc<BrowserCoordinator>, tab_id: i32, action: Action) -> TabState {
    match action {
        Action::Extract => coordinator.extract_for_tab(tab_id).await,
        Action::KeyPoints => coordinator.generate_key_points(tab_id).await,
        Action::Article => coordinator.generate_article(tab_id).await,
    }
}

/// Mirror the client's retry notice into the UI while a call is in flight
async fn watch_retry_notice(
    coordinator: Rc<BrowserCoordinator>,
    running: Rc<Cell<bool>>,
    notice: UseStateHandle<Option<String>>,
) {
    while running.get() {
        notice.set(coordinator.retry_notice());
        BrowserClock.sleep(NOTICE_POLL_MS).await;
    }
    notice.set(None);
}

fn status_view(status: &PanelStatus) -> Html {
    match status {
        PanelStatus::NotVideoPage => html! {
            <p class="message-text">{"Open a YouTube video to use Transcript Lens."}</p>
        },
        PanelStatus::NotExtracted => html! {
            <p class="message-text">{"No transcript yet for this video."}</p>
        },
        PanelStatus::Processing { step } => html! {
            <div class="loading-text-center">
                <Spinner />
                <p class="loading-text">{format!("{}...", step)}</p>
            </div>
        },
        PanelStatus::Failed { message } => html! {
            <Alert r#type={AlertType::Danger} title={"Error"} inline={true}>
                {message.clone()}
            </Alert>
        },
        PanelStatus::TranscriptReady { segments } => html! {
            <Alert r#type={AlertType::Success} title={format!("Transcript ready ({} segments)", segments)} inline={true}>
            </Alert>
        },
        PanelStatus::KeyPointsReady => html! {
            <Alert r#type={AlertType::Success} title={"Key points ready"} inline={true}>
            </Alert>
        },
        PanelStatus::ArticleReady => html! {
            <Alert r#type={AlertType::Success} title={"Article ready"} inline={true}>
            </Alert>
        },
    }
}

#[function_component(App)]
pub fn app() -> Html {
    let state = use_state(|| AppState::Loading);
    let coordinator = use_state(|| None::<Rc<BrowserCoordinator>>);
    let tab_state = use_state(|| None::<TabState>);
    let has_key = use_state(|| false);
    let key_input = use_state(String::new);
    let key_check = use_state(|| KeyCheck::Unchecked);
    let notice = use_state(|| None::<String>);

    // Wire up the coordinator and observe the active tab on mount
    {
        let state = state.clone();
        let coordinator = coordinator.clone();
        let tab_state = tab_state.clone();
        let has_key = has_key.clone();

        use_effect_with((), move |_| {
            spawn_local(async move {
                let instance = Rc::new(browser_coordinator().await);
                has_key.set(instance.load_credential().await);

                match get_active_tab().await {
                    Ok(tab) => {
                        let observed = instance.observe_tab(tab.id, &tab.url, &tab.title).await;
                        tab_state.set(Some(observed));
                        state.set(AppState::Idle);
                    }
                    Err(e) => state.set(AppState::Error(e)),
                }
                coordinator.set(Some(instance));
            });
            || ()
        });
    }

    let on_action = {
        let state = state.clone();
        let coordinator = coordinator.clone();
        let tab_state = tab_state.clone();
        let notice = notice.clone();

        move |action: Action, label: &'static str| {
            let state = state.clone();
            let coordinator = coordinator.clone();
            let tab_state = tab_state.clone();
            let notice = notice.clone();

            Callback::from(move |_: MouseEvent| {
                let (Some(instance), Some(current)) = ((*coordinator).clone(), (*tab_state).clone()) else {
                    return;
                };
                let state = state.clone();
                let tab_state = tab_state.clone();
                let running = Rc::new(Cell::new(true));

                state.set(AppState::Busy(label.to_string()));
                spawn_local(watch_retry_notice(instance.clone(), running.clone(), notice.clone()));
                spawn_local(async move {
                    let updated = perform(instance, current.tab_id, action).await;
                    running.set(false);
                    tab_state.set(Some(updated));
                    state.set(AppState::Idle);
                });
            })
        }
    };

    let on_key_input = {
        let key_input = key_input.clone();
        let key_check = key_check.clone();
        Callback::from(move |e: InputEvent| {
            if let Some(input) = e.target_dyn_into::<HtmlInputElement>() {
                key_input.set(input.value());
                key_check.set(KeyCheck::Unchecked);
            }
        })
    };

    let on_save_key = {
        let coordinator = coordinator.clone();
        let key_input = key_input.clone();
        let key_check = key_check.clone();
        let has_key = has_key.clone();

        Callback::from(move |_: MouseEvent| {
            let Some(instance) = (*coordinator).clone() else {
                return;
            };
            let candidate = (*key_input).clone();
            let key_check = key_check.clone();
            let has_key = has_key.clone();

            spawn_local(async move {
                match instance.save_credential(&candidate).await {
                    Ok(()) => {
                        has_key.set(true);
                        key_check.set(KeyCheck::Saved);
                    }
                    Err(e) => key_check.set(KeyCheck::Invalid(e.to_string())),
                }
            });
        })
    };

    let on_test_key = {
        let coordinator = coordinator.clone();
        let key_input = key_input.clone();
        let key_check = key_check.clone();
        let state = state.clone();

        Callback::from(move |_: MouseEvent| {
            let Some(instance) = (*coordinator).clone() else {
                return;
            };
            let candidate = (*key_input).clone();
            let key_check = key_check.clone();
            let state = state.clone();

            state.set(AppState::Busy("Testing API key".to_string()));
            spawn_local(async move {
                let check = match instance.test_credential(&candidate).await {
                    Ok(true) => KeyCheck::Valid,
                    Ok(false) => KeyCheck::Invalid("Unexpected response from the API".to_string()),
                    Err(e) => KeyCheck::Invalid(e.to_string()),
                };
                key_check.set(check);
                state.set(AppState::Idle);
            });
        })
    };

    let on_export = {
        let tab_state = tab_state.clone();
        let state = state.clone();

        move |format: ExportFormat| {
            let tab_state = tab_state.clone();
            let state = state.clone();

            Callback::from(move |_: MouseEvent| {
                let Some(file) = (*tab_state).as_ref().and_then(|s| export_tab(s, format)) else {
                    return;
                };
                if let Err(e) = download(&file.filename, file.mime_type, &file.content) {
                    state.set(AppState::Error(e));
                }
            })
        }
    };

    let on_clear = {
        let coordinator = coordinator.clone();
        let tab_state = tab_state.clone();

        Callback::from(move |_: MouseEvent| {
            let (Some(instance), Some(current)) = ((*coordinator).clone(), (*tab_state).clone()) else {
                return;
            };
            let tab_state = tab_state.clone();

            spawn_local(async move {
                instance.clear_tab(current.tab_id).await;
                let refreshed = instance.observe_tab(current.tab_id, &current.url, &current.title).await;
                tab_state.set(Some(refreshed));
            });
        })
    };

    let status = (*tab_state).as_ref().map(TabState::status);
    // Clearing only waits on this popup; a flag left by another context must not block it
    let popup_busy = !matches!(*state, AppState::Idle);
    let is_busy = popup_busy || matches!(status, Some(PanelStatus::Processing { .. }));
    let can_extract = status.as_ref().is_some_and(|s| *s != PanelStatus::NotVideoPage);
    let can_key_points = *has_key && status.as_ref().is_some_and(PanelStatus::can_extract_key_points);
    let can_article = *has_key && status.as_ref().is_some_and(PanelStatus::can_generate_article);
    let can_export = status.as_ref().is_some_and(PanelStatus::can_extract_key_points);

    html! {
        <div class="padding-20">
            <h1 class="popup-title">{"Transcript Lens"}</h1>

            {match &*state {
                AppState::Loading => html! {
                    <div class="loading-text-center">
                        <Spinner />
                    </div>
                },
                AppState::Busy(msg) => html! {
                    <div class="loading-text-center">
                        <Spinner />
                        <p class="loading-text">{msg}</p>
                    </div>
                },
                AppState::Error(err) => html! {
                    <Alert r#type={AlertType::Danger} title={"Error"} inline={true}>
                        {err.clone()}
                    </Alert>
                },
                AppState::Idle => html! {},
            }}

            if let Some(message) = (*notice).clone() {
                <Alert r#type={AlertType::Warning} title={message} inline={true}>
                </Alert>
            }

            if let Some(status) = &status {
                <div class="message-top-margin">
                    {status_view(status)}
                </div>
            }

            <div class="flex-column-gap">
                <Button onclick={on_action(Action::Extract, "Extracting transcript")} disabled={is_busy || !can_extract} variant={ButtonVariant::Primary} block={true}>
                    {"Extract Transcript"}
                </Button>
                <Button onclick={on_action(Action::KeyPoints, "Extracting key points")} disabled={is_busy || !can_key_points} variant={ButtonVariant::Secondary} block={true}>
                    {"Extract Key Points"}
                </Button>
                <Button onclick={on_action(Action::Article, "Generating article")} disabled={is_busy || !can_article} variant={ButtonVariant::Secondary} block={true}>
                    {"Generate Article"}
                </Button>
            </div>

            if let Some(current) = (*tab_state).as_ref() {
                if let Some(transcript) = current.transcript.as_ref().filter(|t| !t.is_empty()) {
                    <p class="message-text">
                        {format!("{} words from \"{}\"", transcript.word_count(), transcript.video_title)}
                    </p>
                }
                if let Some(key_points) = &current.key_points {
                    <div class="stats-container">
                        <h2 class="stats-title">{"Key Points"}</h2>
                        <pre class="result-text">{key_points.clone()}</pre>
                    </div>
                }
                if let Some(article) = &current.article {
                    <div class="stats-container">
                        <h2 class="stats-title">{"Article"}</h2>
                        <pre class="result-text">{article.clone()}</pre>
                    </div>
                }
            }

            <div class="flex-column-gap message-top-margin">
                <Button onclick={on_export(ExportFormat::Markdown)} disabled={!can_export} variant={ButtonVariant::Secondary} block={true}>
                    {"Export Markdown"}
                </Button>
                <Button onclick={on_export(ExportFormat::PlainText)} disabled={!can_export} variant={ButtonVariant::Secondary} block={true}>
                    {"Export Text"}
                </Button>
                <Button onclick={on_clear} disabled={popup_busy} variant={ButtonVariant::Danger} block={true}>
                    {"Clear Tab Data"}
                </Button>
            </div>

            <div class="stats-container">
                <h2 class="stats-title">{"Anthropic API Key"}</h2>
                <input
                    class="pf-v5-c-form-control"
                    type="password"
                    placeholder={if *has_key { "Saved (enter a new key to replace)" } else { "sk-ant-..." }}
                    value={(*key_input).clone()}
                    oninput={on_key_input}
                />
                <div class="flex-column-gap">
                    <Button onclick={on_save_key} disabled={!is_valid_credential_format(&key_input)} variant={ButtonVariant::Secondary} block={true}>
                        {"Save Key"}
                    </Button>
                    <Button onclick={on_test_key} disabled={is_busy || !is_valid_credential_format(&key_input)} variant={ButtonVariant::Secondary} block={true}>
                        {"Test Key"}
                    </Button>
                </div>
                {match &*key_check {
                    KeyCheck::Unchecked => html! {},
                    KeyCheck::Saved => html! {
                        <Alert r#type={AlertType::Info} title={"API key saved"} inline={true}></Alert>
                    },
                    KeyCheck::Valid => html! {
                        <Alert r#type={AlertType::Success} title={"API key works"} inline={true}></Alert>
                    },
                    KeyCheck::Invalid(reason) => html! {
                        <Alert r#type={AlertType::Danger} title={"API key problem"} inline={true}>
                            {reason.clone()}
                        </Alert>
                    },
                }}
            </div>

            <p class="footer-popup">
                {"Transcript Lens v0.1.0"}
            </p>
        </div>
    }
}
