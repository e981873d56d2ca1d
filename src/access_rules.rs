use leptos::prelude::*;
use leptos::task::spawn_local;

use crate::api::{AccessLevel, AccessRule, ApiClient, FolderEntry};
use crate::dialog::Dialogs;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MatchScope {
    Exact,
    Children,
    Recursive,
}

impl MatchScope {
    pub fn label(self) -> &'static str {
        match self {
            MatchScope::Exact => "This document only",
            MatchScope::Children => "Direct children only",
            MatchScope::Recursive => "This document and all sub documents",
        }
    }

    pub fn icon(self) -> &'static str {
        match self {
            MatchScope::Exact => "fa fa-file-text-o",
            MatchScope::Children => "fa fa-folder-open-o",
            MatchScope::Recursive => "fa fa-sitemap",
        }
    }
}

/// Splits a rule pattern into its folder path and match scope. A bare `/*`
/// or `/**` belongs to the root folder `/`.
pub fn split_pattern(pattern: &str) -> (String, MatchScope) {
    if let Some(base) = pattern.strip_suffix("/**") {
        (normalize_base(base), MatchScope::Recursive)
    } else if let Some(base) = pattern.strip_suffix("/*") {
        (normalize_base(base), MatchScope::Children)
    } else {
        (pattern.to_string(), MatchScope::Exact)
    }
}

fn normalize_base(base: &str) -> String {
    if base.is_empty() {
        "/".to_string()
    } else {
        base.to_string()
    }
}

/// Inverse of [`split_pattern`]. The root folder contributes an empty prefix
/// so `/` + children is `/*`, not `//*`; a root exact match stays `/`.
pub fn build_pattern(folder: &str, scope: MatchScope) -> String {
    let base = if folder == "/" { "" } else { folder };
    let pattern = match scope {
        MatchScope::Exact => base.to_string(),
        MatchScope::Children => format!("{base}/*"),
        MatchScope::Recursive => format!("{base}/**"),
    };
    if pattern.is_empty() {
        "/".to_string()
    } else {
        pattern
    }
}

/// Identity permutation with `index` and its neighbour swapped, or `None`
/// when the move would fall off either end of the list.
pub fn reorder_swap(len: usize, index: usize, direction: isize) -> Option<Vec<usize>> {
    if index >= len {
        return None;
    }
    let target = index as isize + direction;
    if target < 0 || target as usize >= len {
        return None;
    }
    let mut indices: Vec<usize> = (0..len).collect();
    indices.swap(index, target as usize);
    Some(indices)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RuleFormError {
    GroupsRequired,
}

impl RuleFormError {
    pub fn message(self) -> &'static str {
        match self {
            RuleFormError::GroupsRequired => {
                "Please add at least one group for restricted access."
            }
        }
    }
}

/// Draft state behind the rule dialog. `index` is `Some` when editing an
/// existing rule and decides create vs. replace on submit.
#[derive(Clone, Debug, PartialEq)]
pub struct RuleForm {
    pub index: Option<usize>,
    pub folder: String,
    pub scope: MatchScope,
    pub access: AccessLevel,
    pub groups: Vec<String>,
    pub description: String,
}

impl RuleForm {
    pub fn new() -> Self {
        Self {
            index: None,
            folder: "/".to_string(),
            scope: MatchScope::Recursive,
            access: AccessLevel::Restricted,
            groups: Vec::new(),
            description: String::new(),
        }
    }

    pub fn for_rule(index: usize, rule: &AccessRule) -> Self {
        let (folder, scope) = split_pattern(&rule.pattern);
        Self {
            index: Some(index),
            folder,
            scope,
            access: rule.access,
            groups: rule.groups.clone(),
            description: rule.description.clone(),
        }
    }

    pub fn add_group(&mut self, raw: &str) -> bool {
        let group = raw.trim();
        if group.is_empty() || self.groups.iter().any(|g| g == group) {
            return false;
        }
        self.groups.push(group.to_string());
        true
    }

    pub fn remove_group(&mut self, name: &str) {
        self.groups.retain(|g| g != name);
    }

    /// Client-side validation happens here, before any request is issued:
    /// a restricted rule without groups never reaches the server.
    pub fn validate(&self) -> Result<AccessRule, RuleFormError> {
        if self.access == AccessLevel::Restricted && self.groups.is_empty() {
            return Err(RuleFormError::GroupsRequired);
        }
        let description = if self.description.is_empty() {
            self.folder.clone()
        } else {
            self.description.clone()
        };
        Ok(AccessRule {
            pattern: build_pattern(&self.folder, self.scope),
            access: self.access,
            groups: if self.access == AccessLevel::Restricted {
                self.groups.clone()
            } else {
                Vec::new()
            },
            description,
        })
    }
}

impl Default for RuleForm {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, PartialEq)]
enum FolderTree {
    Loading,
    Ready(Vec<FolderEntry>),
    Failed,
}

async fn refresh_rules(client: &ApiClient, rules: RwSignal<Vec<AccessRule>>) {
    match client.list_rules().await {
        Ok(list) => rules.set(list),
        Err(err) => {
            leptos::logging::error!("failed to load access rules: {err}");
            rules.set(Vec::new());
        }
    }
}

#[component]
pub fn AccessRulesPanel() -> impl IntoView {
    let client = expect_context::<ApiClient>();
    let dialogs = expect_context::<Dialogs>();

    let rules = RwSignal::new(Vec::<AccessRule>::new());
    let form = RwSignal::new(None::<RuleForm>);
    let tree = RwSignal::new(FolderTree::Loading);
    let group_input = RwSignal::new(String::new());

    {
        let client = client.clone();
        Effect::new(move |_| {
            let client = client.clone();
            spawn_local(async move {
                refresh_rules(&client, rules).await;
            });
        });
    }

    let open_form = {
        let client = client.clone();
        move |index: Option<usize>| {
            let draft = match index {
                Some(i) => rules.with(|r| r.get(i).map(|rule| RuleForm::for_rule(i, rule))),
                None => Some(RuleForm::new()),
            };
            let Some(draft) = draft else { return };
            group_input.set(String::new());
            form.set(Some(draft));
            tree.set(FolderTree::Loading);
            let client = client.clone();
            spawn_local(async move {
                match client.list_folders().await {
                    Ok(folders) => tree.set(FolderTree::Ready(folders)),
                    Err(err) => {
                        leptos::logging::error!("failed to load folders: {err}");
                        tree.set(FolderTree::Failed);
                    }
                }
            });
        }
    };

    let submit_form = {
        let client = client.clone();
        move |ev: leptos::ev::SubmitEvent| {
            ev.prevent_default();
            let Some(draft) = form.get() else { return };
            let client = client.clone();
            spawn_local(async move {
                let rule = match draft.validate() {
                    Ok(rule) => rule,
                    Err(err) => {
                        dialogs.message("Validation Error", err.message()).await;
                        return;
                    }
                };
                let result = match draft.index {
                    Some(index) => client.update_rule(index, &rule).await,
                    None => client.create_rule(&rule).await,
                };
                match result {
                    Ok(()) => {
                        form.set(None);
                        refresh_rules(&client, rules).await;
                    }
                    Err(err) => {
                        leptos::logging::error!("failed to save rule: {err}");
                        dialogs
                            .message(
                                "Error",
                                &format!("Failed to save rule: {}", err.user_message()),
                            )
                            .await;
                    }
                }
            });
        }
    };

    let delete_rule = {
        let client = client.clone();
        move |index: usize| {
            let client = client.clone();
            spawn_local(async move {
                let confirmed = dialogs
                    .confirm("Delete Rule", "Are you sure you want to delete this rule?")
                    .await;
                if !confirmed {
                    return;
                }
                match client.delete_rule(index).await {
                    Ok(()) => refresh_rules(&client, rules).await,
                    Err(err) => {
                        leptos::logging::error!("failed to delete rule: {err}");
                        dialogs.message("Error", "Failed to delete rule").await;
                    }
                }
            });
        }
    };

    // Reorder failures only log; the next successful reload shows the real
    // server order either way.
    let move_rule = {
        let client = client.clone();
        move |index: usize, direction: isize| {
            let len = rules.with(|r| r.len());
            let Some(indices) = reorder_swap(len, index, direction) else {
                return;
            };
            let client = client.clone();
            spawn_local(async move {
                match client.reorder_rules(&indices).await {
                    Ok(()) => refresh_rules(&client, rules).await,
                    Err(err) => leptos::logging::error!("failed to reorder rules: {err}"),
                }
            });
        }
    };

    let add_group = move || {
        let raw = group_input.get();
        form.update(|f| {
            if let Some(f) = f.as_mut() {
                if f.add_group(&raw) {
                    group_input.set(String::new());
                }
            }
        });
    };

    let rule_list = {
        let open_form = open_form.clone();
        move || {
            let list = rules.get();
            if list.is_empty() {
                return view! {
                    <div class="empty-message">"No access rules defined"</div>
                }
                .into_any();
            }
            let last = list.len() - 1;
            list.into_iter()
                .enumerate()
                .map(|(index, rule)| {
                    let open_form = open_form.clone();
                    let delete_rule = delete_rule.clone();
                    let move_up = move_rule.clone();
                    let move_down = move_rule.clone();
                    let (base_path, scope) = split_pattern(&rule.pattern);
                    let access_icon = match rule.access {
                        AccessLevel::Public => "fa fa-globe",
                        AccessLevel::Private => "fa fa-lock",
                        AccessLevel::Restricted => "fa fa-shield",
                    };
                    let has_description = !rule.description.is_empty();
                    let title = if has_description {
                        rule.description.clone()
                    } else {
                        base_path.clone()
                    };
                    let subtitle = if has_description {
                        base_path.clone()
                    } else {
                        scope.label().to_string()
                    };
                    view! {
                        <div class="access-rule-item">
                            <div class="rule-icon">
                                <i class=access_icon></i>
                            </div>
                            <div class="rule-body">
                                <div
                                    class="rule-title"
                                    style:font-family=if has_description {
                                        "inherit"
                                    } else {
                                        "monospace"
                                    }
                                >
                                    {title}
                                </div>
                                <div class="rule-subtitle">
                                    <span class="match-type" title=scope.label()>
                                        <i class=scope.icon()></i>
                                    </span>
                                    " "
                                    <span class="rule-path">{subtitle}</span>
                                </div>
                                <div class="rule-groups">
                                    {rule
                                        .groups
                                        .iter()
                                        .map(|group| {
                                            view! { <span class="group-tag">{group.clone()}</span> }
                                        })
                                        .collect::<Vec<_>>()}
                                </div>
                            </div>
                            <span class=format!(
                                "rule-access-badge access-{}",
                                rule.access.as_str(),
                            )>{rule.access.as_str()}</span>
                            <div class="rule-actions">
                                <button
                                    class="move-up"
                                    style:visibility=if index == 0 { "hidden" } else { "visible" }
                                    on:click=move |_| move_up(index, -1)
                                >
                                    <i class="fa fa-chevron-up"></i>
                                </button>
                                <button
                                    class="move-down"
                                    style:display=if index == last { "none" } else { "inline-block" }
                                    on:click=move |_| move_down(index, 1)
                                >
                                    <i class="fa fa-chevron-down"></i>
                                </button>
                                <button class="edit-rule" on:click=move |_| open_form(Some(index))>
                                    <i class="fa fa-pencil"></i>
                                </button>
                                <button class="delete-rule" on:click=move |_| delete_rule(index)>
                                    <i class="fa fa-trash"></i>
                                </button>
                            </div>
                        </div>
                    }
                })
                .collect::<Vec<_>>()
                .into_any()
        }
    };

    let folder_tree = move || match tree.get() {
        FolderTree::Loading => view! { <div class="loading">"Loading folders..."</div> }.into_any(),
        FolderTree::Failed => view! { <div class="error">"Failed to load folders"</div> }.into_any(),
        FolderTree::Ready(folders) => {
            if folders.is_empty() {
                return view! { <div class="empty-message">"No folders found"</div> }.into_any();
            }
            folders
                .into_iter()
                .map(|folder| {
                    let path = folder.path.clone();
                    let selected = {
                        let path = path.clone();
                        move || form.with(|f| f.as_ref().is_some_and(|f| f.folder == path))
                    };
                    view! {
                        <div
                            class="folder-tree-item"
                            class:selected=selected
                            style:padding-left=format!("{}px", folder.level * 20 + 10)
                            on:click=move |_| {
                                let path = path.clone();
                                form.update(|f| {
                                    if let Some(f) = f.as_mut() {
                                        f.folder = path;
                                    }
                                });
                            }
                        >
                            <i class="fa fa-folder folder-icon"></i>
                            <span class="folder-name">{folder.name}</span>
                        </div>
                    }
                })
                .collect::<Vec<_>>()
                .into_any()
        }
    };

    let scope_radio = move |scope: MatchScope, label: &'static str| {
        view! {
            <label class="radio-option">
                <input
                    type="radio"
                    name="matchType"
                    prop:checked=move || form.with(|f| f.as_ref().is_some_and(|f| f.scope == scope))
                    on:change=move |_| {
                        form.update(|f| {
                            if let Some(f) = f.as_mut() {
                                f.scope = scope;
                            }
                        })
                    }
                />
                {label}
            </label>
        }
    };

    let access_radio = move |access: AccessLevel, label: &'static str| {
        view! {
            <label class="radio-option">
                <input
                    type="radio"
                    name="accessLevel"
                    prop:checked=move || {
                        form.with(|f| f.as_ref().is_some_and(|f| f.access == access))
                    }
                    on:change=move |_| {
                        form.update(|f| {
                            if let Some(f) = f.as_mut() {
                                f.access = access;
                            }
                        })
                    }
                />
                {label}
            </label>
        }
    };

    let open_add = open_form.clone();
    view! {
        <div class="access-rules-tab">
            <div class="tab-header">
                <button class="primary-button" on:click=move |_| open_add(None)>
                    <i class="fa fa-plus"></i>
                    " Add Rule"
                </button>
            </div>
            <div class="access-rules-list">{rule_list}</div>
            {move || {
                form.with(|f| f.is_some())
                    .then(|| {
                        let submit_form = submit_form.clone();
                        view! {
                            <div class="dialog-overlay access-rule-dialog active">
                                <div class="dialog-container">
                                    <h3 class="dialog-title">
                                        {move || {
                                            form.with(|f| {
                                                if f.as_ref().is_some_and(|f| f.index.is_some()) {
                                                    "Edit Access Rule"
                                                } else {
                                                    "New Access Rule"
                                                }
                                            })
                                        }}
                                    </h3>
                                    <form class="access-rule-form" on:submit=submit_form>
                                        <div class="form-section">
                                            <label>"Folder"</label>
                                            <div class="selected-folder-path">
                                                {move || {
                                                    form.with(|f| {
                                                        f.as_ref().map(|f| f.folder.clone()).unwrap_or_default()
                                                    })
                                                }}
                                            </div>
                                            <div class="folder-tree">{folder_tree}</div>
                                        </div>
                                        <div class="form-section">
                                            <label>"Applies to"</label>
                                            {scope_radio(MatchScope::Exact, "This document only")}
                                            {scope_radio(MatchScope::Children, "Direct children only")}
                                            {scope_radio(
                                                MatchScope::Recursive,
                                                "This document and all sub documents",
                                            )}
                                        </div>
                                        <div class="form-section">
                                            <label>"Access level"</label>
                                            {access_radio(AccessLevel::Public, "Public")}
                                            {access_radio(AccessLevel::Private, "Private")}
                                            {access_radio(AccessLevel::Restricted, "Restricted")}
                                        </div>
                                        <div
                                            class="groups-container form-section"
                                            style:display=move || {
                                                if form
                                                    .with(|f| {
                                                        f.as_ref().is_some_and(|f| f.access == AccessLevel::Restricted)
                                                    })
                                                {
                                                    "block"
                                                } else {
                                                    "none"
                                                }
                                            }
                                        >
                                            <label>"Groups"</label>
                                            <div class="selected-groups">
                                                {move || {
                                                    form.with(|f| {
                                                        f.as_ref()
                                                            .map(|f| f.groups.clone())
                                                            .unwrap_or_default()
                                                            .into_iter()
                                                            .map(|group| {
                                                                let name = group.clone();
                                                                view! {
                                                                    <div class="group-tag-removable">
                                                                        <span>{group}</span>
                                                                        <span
                                                                            class="remove-group"
                                                                            on:click=move |_| {
                                                                                let name = name.clone();
                                                                                form.update(|f| {
                                                                                    if let Some(f) = f.as_mut() {
                                                                                        f.remove_group(&name);
                                                                                    }
                                                                                });
                                                                            }
                                                                        >
                                                                            "\u{d7}"
                                                                        </span>
                                                                    </div>
                                                                }
                                                            })
                                                            .collect::<Vec<_>>()
                                                    })
                                                }}
                                            </div>
                                            <div class="group-input-row">
                                                <input
                                                    type="text"
                                                    class="group-input"
                                                    placeholder="Group name"
                                                    prop:value=move || group_input.get()
                                                    on:input=move |ev| group_input.set(event_target_value(&ev))
                                                    on:keydown=move |ev: leptos::ev::KeyboardEvent| {
                                                        if ev.key() == "Enter" {
                                                            ev.prevent_default();
                                                            add_group();
                                                        }
                                                    }
                                                />
                                                <button
                                                    type="button"
                                                    class="add-group-btn"
                                                    on:click=move |_| add_group()
                                                >
                                                    "Add"
                                                </button>
                                            </div>
                                        </div>
                                        <div class="form-section">
                                            <label>"Description"</label>
                                            <input
                                                type="text"
                                                class="rule-description"
                                                prop:value=move || {
                                                    form.with(|f| {
                                                        f.as_ref().map(|f| f.description.clone()).unwrap_or_default()
                                                    })
                                                }
                                                on:input=move |ev| {
                                                    let value = event_target_value(&ev);
                                                    form.update(|f| {
                                                        if let Some(f) = f.as_mut() {
                                                            f.description = value;
                                                        }
                                                    });
                                                }
                                            />
                                        </div>
                                        <div class="dialog-buttons">
                                            <button
                                                type="button"
                                                class="cancel-dialog"
                                                on:click=move |_| form.set(None)
                                            >
                                                "Cancel"
                                            </button>
                                            <button type="submit" class="primary-button">
                                                "Save"
                                            </button>
                                        </div>
                                    </form>
                                </div>
                            </div>
                        }
                    })
            }}
        </div>
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pattern_round_trips_for_every_scope() {
        for scope in [MatchScope::Exact, MatchScope::Children, MatchScope::Recursive] {
            let pattern = build_pattern("/finance", scope);
            assert_eq!(split_pattern(&pattern), ("/finance".to_string(), scope));
        }
        assert_eq!(build_pattern("/finance", MatchScope::Recursive), "/finance/**");
        assert_eq!(build_pattern("/finance", MatchScope::Children), "/finance/*");
        assert_eq!(build_pattern("/finance", MatchScope::Exact), "/finance");
    }

    #[test]
    fn root_folder_maps_to_bare_suffixes() {
        assert_eq!(build_pattern("/", MatchScope::Exact), "/");
        assert_eq!(build_pattern("/", MatchScope::Children), "/*");
        assert_eq!(build_pattern("/", MatchScope::Recursive), "/**");

        assert_eq!(split_pattern("/"), ("/".to_string(), MatchScope::Exact));
        assert_eq!(split_pattern("/*"), ("/".to_string(), MatchScope::Children));
        assert_eq!(split_pattern("/**"), ("/".to_string(), MatchScope::Recursive));
    }

    #[test]
    fn restricted_rule_without_groups_fails_validation() {
        let mut form = RuleForm::new();
        form.folder = "/finance".to_string();
        assert_eq!(form.validate(), Err(RuleFormError::GroupsRequired));

        form.add_group("accounting");
        let rule = form.validate().unwrap();
        assert_eq!(rule.pattern, "/finance/**");
        assert_eq!(rule.groups, vec!["accounting".to_string()]);
    }

    #[test]
    fn non_restricted_rule_drops_groups() {
        let mut form = RuleForm::new();
        form.access = AccessLevel::Public;
        form.groups = vec!["accounting".to_string()];
        let rule = form.validate().unwrap();
        assert!(rule.groups.is_empty());
    }

    #[test]
    fn empty_description_falls_back_to_folder() {
        let mut form = RuleForm::new();
        form.folder = "/docs".to_string();
        form.access = AccessLevel::Private;
        assert_eq!(form.validate().unwrap().description, "/docs");

        form.description = "Internal docs".to_string();
        assert_eq!(form.validate().unwrap().description, "Internal docs");
    }

    #[test]
    fn add_group_trims_and_dedups() {
        let mut form = RuleForm::new();
        assert!(form.add_group("  staff  "));
        assert!(!form.add_group("staff"));
        assert!(!form.add_group("   "));
        assert_eq!(form.groups, vec!["staff".to_string()]);

        form.remove_group("staff");
        assert!(form.groups.is_empty());
    }

    #[test]
    fn form_prefills_from_existing_rule() {
        let rule = AccessRule {
            pattern: "/wiki/*".to_string(),
            access: AccessLevel::Restricted,
            groups: vec!["editors".to_string()],
            description: "Wiki children".to_string(),
        };
        let form = RuleForm::for_rule(3, &rule);
        assert_eq!(form.index, Some(3));
        assert_eq!(form.folder, "/wiki");
        assert_eq!(form.scope, MatchScope::Children);
        assert_eq!(form.groups, vec!["editors".to_string()]);
    }

    #[test]
    fn reorder_is_noop_at_the_boundaries() {
        assert_eq!(reorder_swap(5, 0, -1), None);
        assert_eq!(reorder_swap(5, 4, 1), None);
        assert_eq!(reorder_swap(0, 0, 1), None);
        assert_eq!(reorder_swap(5, 1, -1), Some(vec![1, 0, 2, 3, 4]));
        assert_eq!(reorder_swap(5, 1, 1), Some(vec![0, 2, 1, 3, 4]));
    }
}
