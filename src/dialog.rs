use futures::channel::oneshot;
use leptos::prelude::*;

#[derive(Clone, Copy, PartialEq, Eq)]
enum DialogKind {
    Message,
    Confirm,
}

struct ActiveDialog {
    title: String,
    body: String,
    kind: DialogKind,
    responder: Option<oneshot::Sender<bool>>,
}

/// Awaitable replacement for callback-style message/confirm dialogs. A call
/// site does `dialogs.confirm(...).await` and reads the answer inline; the
/// dialog itself is rendered by [`DialogHost`] from shared context.
#[derive(Clone, Copy)]
pub struct Dialogs {
    active: RwSignal<Option<ActiveDialog>>,
}

impl Dialogs {
    pub fn provide() -> Self {
        let dialogs = Self {
            active: RwSignal::new(None),
        };
        provide_context(dialogs);
        dialogs
    }

    pub async fn message(self, title: &str, body: &str) {
        let _ = self.show(title, body, DialogKind::Message).await;
    }

    pub async fn confirm(self, title: &str, body: &str) -> bool {
        self.show(title, body, DialogKind::Confirm).await
    }

    async fn show(self, title: &str, body: &str, kind: DialogKind) -> bool {
        let (tx, rx) = oneshot::channel();
        // Replacing a dialog that is still open resolves it as dismissed.
        self.resolve(false);
        self.active.set(Some(ActiveDialog {
            title: title.to_string(),
            body: body.to_string(),
            kind,
            responder: Some(tx),
        }));
        rx.await.unwrap_or(false)
    }

    fn resolve(self, answer: bool) {
        self.active.update(|slot| {
            if let Some(dialog) = slot.as_mut() {
                if let Some(tx) = dialog.responder.take() {
                    let _ = tx.send(answer);
                }
            }
            *slot = None;
        });
    }
}

#[component]
pub fn DialogHost() -> impl IntoView {
    let dialogs = expect_context::<Dialogs>();

    view! {
        {move || {
            dialogs
                .active
                .with(|active| {
                    active
                        .as_ref()
                        .map(|dialog| (dialog.title.clone(), dialog.body.clone(), dialog.kind))
                })
                .map(|(title, body, kind)| {
                    view! {
                        <div class="dialog-overlay active">
                            <div class="dialog-container">
                                <h3 class="dialog-title">{title}</h3>
                                <div class="dialog-message">{body}</div>
                                <div class="dialog-buttons">
                                    {(kind == DialogKind::Confirm)
                                        .then(|| {
                                            view! {
                                                <button
                                                    class="cancel-dialog"
                                                    on:click=move |_| dialogs.resolve(false)
                                                >
                                                    "Cancel"
                                                </button>
                                            }
                                        })}
                                    <button
                                        class="primary-button"
                                        on:click=move |_| dialogs.resolve(true)
                                    >
                                        "OK"
                                    </button>
                                </div>
                            </div>
                        </div>
                    }
                })
        }}
    }
}
