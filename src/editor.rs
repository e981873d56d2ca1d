use std::sync::OnceLock;

use gloo_timers::callback::Timeout;
use leptos::prelude::*;
use leptos::task::spawn_local;
use regex::{Captures, Regex};
use wasm_bindgen::JsCast;

use crate::api::ApiClient;
use crate::edit_commands::{
    self, Command, EditBuffer, selection_from_utf16, selection_to_utf16, BOLD, BULLET_LIST,
    HEADING, INLINE_CODE, ITALIC, QUOTE, STRIKETHROUGH,
};
use crate::lazy_assets::{self, Assets, Library};

const PREVIEW_DEBOUNCE_MS: u32 = 300;
const REFOCUS_DELAY_MS: u32 = 50;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EditorMode {
    Edit,
    Preview,
    Split,
}

/// The edit/preview/split machine. Full preview remembers which mode it was
/// entered from so toggling it again returns there, not always to edit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ModeState {
    pub mode: EditorMode,
    before_preview: EditorMode,
}

impl ModeState {
    pub fn new() -> Self {
        Self {
            mode: EditorMode::Edit,
            before_preview: EditorMode::Edit,
        }
    }

    pub fn toggle_preview(&mut self) {
        if self.mode == EditorMode::Preview {
            self.mode = self.before_preview;
        } else {
            self.before_preview = self.mode;
            self.mode = EditorMode::Preview;
        }
    }

    pub fn toggle_split(&mut self) {
        self.mode = if self.mode == EditorMode::Split {
            EditorMode::Edit
        } else {
            EditorMode::Split
        };
    }
}

impl Default for ModeState {
    fn default() -> Self {
        Self::new()
    }
}

/// Markup for the highlight layer that sits under the transparent textarea.
/// Single pass over the escaped source, so inserted spans are never
/// re-matched; every match keeps its full text to stay aligned with the
/// textarea characters.
pub fn highlight_source(text: &str) -> String {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(
            r"(?m)(?:^(#{1,4})[^\S\n].*$)|(?:^(&gt;).*$)|(\*\*.+?\*\*)|(~~.+?~~)|(`[^`\n]+`)|(\[[^\]\n]+\]\([^)\n]+\))|(\*[^*\n]+\*)",
        )
        .unwrap()
    });

    let escaped = text
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;");

    let mut html = re
        .replace_all(&escaped, |caps: &Captures| {
            let class = if let Some(hashes) = caps.get(1) {
                match hashes.as_str().len() {
                    1 => "md-h1",
                    2 => "md-h2",
                    3 => "md-h3",
                    _ => "md-h4",
                }
            } else if caps.get(2).is_some() {
                "md-quote"
            } else if caps.get(3).is_some() {
                "md-bold"
            } else if caps.get(4).is_some() {
                "md-strike"
            } else if caps.get(5).is_some() {
                "md-code"
            } else if caps.get(6).is_some() {
                "md-link"
            } else {
                "md-italic"
            };
            format!("<span class=\"{class}\">{}</span>", &caps[0])
        })
        .into_owned();

    // Trailing space keeps the layer's height in sync with the textarea when
    // the text ends in a newline.
    html.push_str("\n ");
    html
}

fn capture_mermaid_sources(root: &web_sys::Element) {
    // Grab the raw diagram text before any library rewrites the nodes, so a
    // later re-render can start from the original source.
    let Ok(nodes) = root.query_selector_all(".mermaid") else {
        return;
    };
    for i in 0..nodes.length() {
        let Some(node) = nodes.item(i) else { continue };
        let Ok(el) = node.dyn_into::<web_sys::Element>() else {
            continue;
        };
        if let Some(text) = el.text_content() {
            let trimmed = text.trim();
            if !trimmed.is_empty() {
                let _ = el.set_attribute("data-mermaid-source", trimmed);
            }
        }
    }
}

async fn activate_rendering_libraries(assets: Assets, root: &web_sys::Element, html: &str) {
    let code = async {
        if lazy_assets::sniff_code(html) {
            assets.force_load(Library::Prism).await;
            lazy_assets::highlight_code_under(root);
        }
    };
    let math = async {
        if lazy_assets::sniff_math(html) {
            assets.force_load(Library::MathJax).await;
            lazy_assets::typeset_math_under(root);
        }
    };
    let diagrams = async {
        if lazy_assets::sniff_mermaid(html) {
            assets.force_load(Library::Mermaid).await;
            lazy_assets::render_diagrams_under(root);
        }
    };
    futures::join!(code, math, diagrams);
}

#[component]
pub fn EditorPane(#[prop(optional)] initial: String) -> impl IntoView {
    let client = expect_context::<ApiClient>();
    let assets = expect_context::<Assets>();

    let content = RwSignal::new(initial);
    let mode = RwSignal::new(ModeState::new());
    let kanban = RwSignal::new(false);
    let scroll_top = RwSignal::new(0);

    let textarea_ref = NodeRef::<leptos::html::Textarea>::new();
    let preview_ref = NodeRef::<leptos::html::Div>::new();
    let debounce = StoredValue::new_local(None::<Timeout>);

    let render_preview = {
        let client = client.clone();
        move || {
            let client = client.clone();
            spawn_local(async move {
                let Some(preview) = preview_ref.get_untracked() else {
                    return;
                };
                preview.set_inner_html(r#"<div class="preview-loading">Loading preview...</div>"#);

                let path = window()
                    .location()
                    .pathname()
                    .unwrap_or_else(|_| "/".to_string());
                let text = content.get_untracked();
                let has_frontmatter = text.starts_with("---\n");

                match client.render_markdown(&path, &text).await {
                    Ok(html) => {
                        kanban.set(has_frontmatter && html.contains("kanban-board"));
                        preview.set_inner_html(&html);
                        capture_mermaid_sources(&preview);
                        activate_rendering_libraries(assets, &preview, &html).await;
                    }
                    Err(err) => {
                        leptos::logging::error!("preview render failed: {err}");
                        preview.set_inner_html("<p>Error rendering preview</p>");
                    }
                }
            });
        }
    };

    let schedule_preview = {
        let render_preview = render_preview.clone();
        move || {
            let render_preview = render_preview.clone();
            debounce.update_value(|slot| {
                if let Some(timer) = slot.take() {
                    timer.cancel();
                }
                *slot = Some(Timeout::new(PREVIEW_DEBOUNCE_MS, move || render_preview()));
            });
        }
    };

    let apply_mode = {
        let render_preview = render_preview.clone();
        move || {
            if mode.get_untracked().mode == EditorMode::Edit {
                debounce.update_value(|slot| {
                    if let Some(timer) = slot.take() {
                        timer.cancel();
                    }
                });
                kanban.set(false);
                if let Some(preview) = preview_ref.get_untracked() {
                    preview.set_inner_html("");
                }
                Timeout::new(REFOCUS_DELAY_MS, move || {
                    if let Some(textarea) = textarea_ref.get_untracked() {
                        let _ = textarea.focus();
                    }
                })
                .forget();
            } else {
                render_preview();
            }
        }
    };

    let toggle_preview = {
        let apply_mode = apply_mode.clone();
        move || {
            mode.update(|m| m.toggle_preview());
            apply_mode();
        }
    };
    let toggle_split = {
        let apply_mode = apply_mode.clone();
        move || {
            mode.update(|m| m.toggle_split());
            apply_mode();
        }
    };

    // Toolbar commands run against the textarea's live selection, converted
    // from UTF-16 offsets, and put the caret back where the command left it.
    let run_command = {
        let schedule_preview = schedule_preview.clone();
        move |command: Command| -> bool {
            let Some(textarea) = textarea_ref.get_untracked() else {
                return false;
            };
            let text = content.get_untracked();
            let start = textarea.selection_start().ok().flatten().unwrap_or(0) as usize;
            let end = textarea.selection_end().ok().flatten().unwrap_or(0) as usize;
            let selection = selection_from_utf16(&text, start, end);
            let mut buffer = EditBuffer::new(text, selection);
            if !edit_commands::apply(&mut buffer, command) {
                return false;
            }
            textarea.set_value(&buffer.text);
            let (start16, end16) = selection_to_utf16(&buffer.text, buffer.selection);
            let _ = textarea.focus();
            let _ = textarea.set_selection_range(start16 as u32, end16 as u32);
            content.set(buffer.text);
            if mode.get_untracked().mode == EditorMode::Split {
                schedule_preview();
            }
            true
        }
    };

    let buttons_disabled = move || mode.get().mode == EditorMode::Preview;

    let tool_button = {
        let run_command = run_command.clone();
        move |icon: &'static str, label: &'static str, command: Command| {
            let run = run_command.clone();
            view! {
                <button
                    type="button"
                    class="toolbar-button"
                    class:disabled=buttons_disabled
                    prop:disabled=buttons_disabled
                    title=label
                    on:click=move |_| {
                        run(command);
                    }
                >
                    <i class=icon></i>
                </button>
            }
        }
    };

    let on_keydown = {
        let run_command = run_command.clone();
        let toggle_preview = toggle_preview.clone();
        let toggle_split = toggle_split.clone();
        move |ev: leptos::ev::KeyboardEvent| {
            if ev.ctrl_key() && ev.shift_key() {
                match ev.key().as_str() {
                    "P" | "p" => {
                        ev.prevent_default();
                        toggle_preview();
                        return;
                    }
                    "S" | "s" => {
                        ev.prevent_default();
                        toggle_split();
                        return;
                    }
                    _ => {}
                }
            }
            if ev.key() == "Enter"
                && !ev.shift_key()
                && !ev.ctrl_key()
                && !ev.meta_key()
                && run_command(Command::ContinueBlock)
            {
                ev.prevent_default();
            }
        }
    };

    let on_input = {
        let schedule_preview = schedule_preview.clone();
        move |ev: leptos::ev::Event| {
            content.set(event_target_value(&ev));
            if mode.get_untracked().mode == EditorMode::Split {
                schedule_preview();
            }
        }
    };

    let is_split = move || mode.get().mode == EditorMode::Split;
    let is_preview = move || mode.get().mode == EditorMode::Preview;
    let in_preview_or_split = move || mode.get().mode != EditorMode::Edit;

    let preview_button = {
        let toggle_preview = toggle_preview.clone();
        move || {
            let toggle_preview = toggle_preview.clone();
            let (icon, label) = if is_preview() {
                ("fa fa-edit", "Back to Edit Mode")
            } else {
                ("fa fa-eye", "Toggle Preview (Ctrl+Shift+P)")
            };
            view! {
                <button
                    type="button"
                    class="toolbar-button preview-button"
                    title=label
                    on:click=move |_| toggle_preview()
                >
                    <i class=icon></i>
                </button>
            }
        }
    };

    let split_button = {
        let toggle_split = toggle_split.clone();
        move || {
            let toggle_split = toggle_split.clone();
            let (icon, label) = if is_split() {
                ("fa fa-compress", "Exit Split View (Ctrl+Shift+S)")
            } else {
                ("fa fa-columns", "Toggle Split View (Ctrl+Shift+S)")
            };
            view! {
                <button
                    type="button"
                    class="toolbar-button split-button"
                    class:active=is_split
                    class:disabled=buttons_disabled
                    prop:disabled=buttons_disabled
                    title=label
                    on:click=move |_| toggle_split()
                >
                    <i class=icon></i>
                </button>
            }
        }
    };

    view! {
        <div class="editor-area" class:split-mode=is_split>
            <div class="custom-toolbar">
                {tool_button("fa fa-bold", "Bold", BOLD)}
                {tool_button("fa fa-italic", "Italic", ITALIC)}
                {tool_button("fa fa-strikethrough", "Strikethrough", STRIKETHROUGH)}
                {tool_button("fa fa-code", "Inline Code", INLINE_CODE)}
                {tool_button("fa fa-header", "Heading", HEADING)}
                {tool_button("fa fa-quote-right", "Quote", QUOTE)}
                {tool_button("fa fa-list-ul", "Bullet List", BULLET_LIST)}
                {tool_button("fa fa-link", "Link", Command::Link)}
                <span class="toolbar-spacer"></span>
                {split_button}
                {preview_button}
            </div>
            <div
                class="editor-surface"
                style:display=move || if is_preview() { "none" } else { "block" }
            >
                <div
                    class="markdown-highlight-layer"
                    inner_html=move || highlight_source(&content.get())
                    prop:scrollTop=move || scroll_top.get()
                ></div>
                <textarea
                    class="raw-editor"
                    node_ref=textarea_ref
                    prop:value=move || content.get()
                    on:input=on_input
                    on:keydown=on_keydown
                    on:scroll=move |ev| {
                        let target: web_sys::Element = event_target(&ev);
                        scroll_top.set(target.scroll_top());
                    }
                    placeholder="Start writing markdown..."
                    spellcheck="false"
                ></textarea>
            </div>
            <div
                class="editor-preview"
                class:editor-preview-active=in_preview_or_split
                class:editor-preview-full=is_preview
                class:kanban-preview=move || kanban.get()
                node_ref=preview_ref
            ></div>
        </div>
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_toggles_back_to_the_previous_mode() {
        let mut state = ModeState::new();
        assert_eq!(state.mode, EditorMode::Edit);

        state.toggle_preview();
        assert_eq!(state.mode, EditorMode::Preview);
        state.toggle_preview();
        assert_eq!(state.mode, EditorMode::Edit);

        state.toggle_split();
        state.toggle_preview();
        assert_eq!(state.mode, EditorMode::Preview);
        state.toggle_preview();
        assert_eq!(state.mode, EditorMode::Split);
    }

    #[test]
    fn split_toggles_between_edit_and_split() {
        let mut state = ModeState::new();
        state.toggle_split();
        assert_eq!(state.mode, EditorMode::Split);
        state.toggle_split();
        assert_eq!(state.mode, EditorMode::Edit);
    }

    #[test]
    fn split_from_full_preview_enters_split() {
        let mut state = ModeState::new();
        state.toggle_preview();
        state.toggle_split();
        assert_eq!(state.mode, EditorMode::Split);
    }

    #[test]
    fn highlights_headings_by_level() {
        assert_eq!(
            highlight_source("## Notes"),
            "<span class=\"md-h2\">## Notes</span>\n "
        );
    }

    #[test]
    fn highlight_keeps_marker_characters() {
        assert_eq!(
            highlight_source("x **y**"),
            "x <span class=\"md-bold\">**y**</span>\n "
        );
        assert_eq!(
            highlight_source("`a`"),
            "<span class=\"md-code\">`a`</span>\n "
        );
    }

    #[test]
    fn highlight_escapes_markup_and_marks_quotes() {
        assert_eq!(
            highlight_source("> a & b"),
            "<span class=\"md-quote\">&gt; a &amp; b</span>\n "
        );
        assert_eq!(highlight_source("1 < 2"), "1 &lt; 2\n ");
    }

    #[test]
    fn bold_is_not_doubly_matched_as_italic() {
        assert_eq!(
            highlight_source("**y**"),
            "<span class=\"md-bold\">**y**</span>\n "
        );
    }
}
