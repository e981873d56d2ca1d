use leptos::prelude::*;
use leptos::task::spawn_local;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;

use crate::access_rules::AccessRulesPanel;
use crate::api::ApiClient;
use crate::backup::BackupPanel;
use crate::config::WikiConfig;
use crate::dialog::{DialogHost, Dialogs};
use crate::editor::EditorPane;
use crate::lazy_assets::Assets;
use crate::sidebar::{Sidebar, SidebarControl};

#[derive(Clone, Copy, PartialEq, Eq)]
enum AdminTab {
    AccessRules,
    Backups,
}

/// Raw markdown of the current document, embedded by the server so the
/// editor can start without another round trip.
fn document_source() -> String {
    document()
        .query_selector("#document-source")
        .ok()
        .flatten()
        .and_then(|el| el.text_content())
        .map(|text| text.trim().to_string())
        .unwrap_or_default()
}

fn current_path() -> String {
    window()
        .location()
        .pathname()
        .unwrap_or_else(|_| "/".to_string())
}

#[component]
pub fn App() -> impl IntoView {
    let client = ApiClient::new();
    provide_context(client.clone());
    let dialogs = Dialogs::provide();
    let assets = Assets::provide();
    let sidebar = SidebarControl::provide();

    let config = RwSignal::new(WikiConfig::from_document());
    let scrolled = RwSignal::new(false);
    let editing = RwSignal::new(false);
    let admin_open = RwSignal::new(false);
    let admin_tab = RwSignal::new(AdminTab::AccessRules);

    let page_ref = NodeRef::<leptos::html::Article>::new();

    // Settings dialog broadcasts changed config as a JSON string detail.
    let settings_listener =
        Closure::<dyn FnMut(web_sys::CustomEvent)>::new(move |e: web_sys::CustomEvent| {
            if let Some(detail) = e.detail().as_string() {
                match serde_json::from_str::<WikiConfig>(&detail) {
                    Ok(next) => config.set(next),
                    Err(err) => leptos::logging::warn!("bad wiki-settings payload: {err}"),
                }
            }
        });
    let _ = window().add_event_listener_with_callback(
        "wiki-settings",
        settings_listener.as_ref().unchecked_ref(),
    );
    settings_listener.forget();

    let scroll_listener = Closure::<dyn FnMut()>::new(move || {
        let y = window().scroll_y().unwrap_or(0.0);
        scrolled.set(y > 10.0);
    });
    let _ = window()
        .add_event_listener_with_callback("scroll", scroll_listener.as_ref().unchecked_ref());
    scroll_listener.forget();
    scrolled.set(window().scroll_y().unwrap_or(0.0) > 10.0);

    // Content width follows the config live, not just at load.
    Effect::new(move |_| {
        let disable = config.get().disable_content_max_width;
        let Some(root) = document()
            .document_element()
            .and_then(|el| el.dyn_into::<web_sys::HtmlElement>().ok())
        else {
            return;
        };
        if disable {
            let _ = root.style().set_property("--content-max-width", "none");
        } else {
            let _ = root.style().remove_property("--content-max-width");
        }
    });

    // Render the embedded document, then let the asset loader sniff the
    // resulting page once the markup is actually in the tree.
    {
        let client = client.clone();
        Effect::new(move |_| {
            let client = client.clone();
            spawn_local(async move {
                let source = document_source();
                if !source.is_empty() {
                    match client.render_markdown(&current_path(), &source).await {
                        Ok(html) => {
                            if let Some(el) = page_ref.get_untracked() {
                                el.set_inner_html(&html);
                            }
                        }
                        Err(err) => leptos::logging::error!("failed to render page: {err}"),
                    }
                }
                assets.init().await;
            });
        });
    }

    let start_editing = {
        let client = client.clone();
        move |_| {
            if editing.get_untracked() {
                return;
            }
            let client = client.clone();
            spawn_local(async move {
                match client.check_auth().await {
                    Ok(true) => editing.set(true),
                    Ok(false) => {
                        dialogs
                            .message("Sign in required", "Please sign in to edit this page.")
                            .await;
                    }
                    Err(err) => leptos::logging::error!("auth check failed: {err}"),
                }
            });
        }
    };

    let admin_dialog = move || {
        admin_open.get().then(|| {
            let tab_button = move |tab: AdminTab, label: &'static str| {
                view! {
                    <button
                        class="tab-button"
                        class:active=move || admin_tab.get() == tab
                        on:click=move |_| admin_tab.set(tab)
                    >
                        {label}
                    </button>
                }
            };
            view! {
                <div class="dialog-overlay admin-dialog active">
                    <div class="dialog-container">
                        <div class="dialog-header">
                            <h3 class="dialog-title">"Administration"</h3>
                            <button class="close-dialog" on:click=move |_| admin_open.set(false)>
                                <i class="fa fa-times"></i>
                            </button>
                        </div>
                        <div class="tab-bar">
                            {tab_button(AdminTab::AccessRules, "Access Rules")}
                            {tab_button(AdminTab::Backups, "Backups")}
                        </div>
                        <div class="tab-content">
                            {move || match admin_tab.get() {
                                AdminTab::AccessRules => view! { <AccessRulesPanel /> }.into_any(),
                                AdminTab::Backups => view! { <BackupPanel /> }.into_any(),
                            }}
                        </div>
                    </div>
                </div>
            }
        })
    };

    view! {
        <main class="app-layout" class:sidebar-active=move || sidebar.open.get()>
            <header class="topbar">
                <button
                    class="hamburger"
                    class:active=move || sidebar.open.get()
                    class:scrolled=move || scrolled.get()
                    on:click=move |ev: leptos::ev::MouseEvent| {
                        ev.stop_propagation();
                        sidebar.toggle();
                    }
                >
                    <i class="fa fa-bars"></i>
                </button>
                <div class="breadcrumbs" class:scrolled=move || scrolled.get()>
                    <span class="breadcrumbs-path">{current_path()}</span>
                </div>
                <div class="topbar-actions">
                    <button class="edit-page" title="Edit this page" on:click=start_editing>
                        <i class="fa fa-pencil"></i>
                    </button>
                    <button
                        class="admin-button"
                        title="Administration"
                        on:click=move |_| admin_open.set(true)
                    >
                        <i class="fa fa-cog"></i>
                    </button>
                </div>
            </header>
            <Sidebar />
            <section
                class="content"
                class:sidebar-active=move || sidebar.open.get()
                class:full-width-content=move || config.get().disable_content_max_width
            >
                {move || {
                    if editing.get() {
                        view! { <EditorPane initial=document_source() /> }.into_any()
                    } else {
                        view! { <article class="markdown-content" node_ref=page_ref></article> }
                            .into_any()
                    }
                }}
            </section>
            {admin_dialog}
            <DialogHost />
        </main>
    }
}
