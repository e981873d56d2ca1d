use std::cell::RefCell;
use std::rc::Rc;

use leptos::prelude::*;
use leptos::task::spawn_local;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;

use crate::api::{ApiClient, FolderEntry};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GestureConfig {
    /// Minimum distance for a discrete swipe.
    pub swipe_threshold: f64,
    /// Width of the left-edge zone that can start an opening gesture.
    pub edge_threshold: f64,
    /// Vertical movement past this aborts gesture recognition.
    pub vertical_threshold: f64,
    /// Horizontal movement past this engages drag-follow.
    pub drag_follow_threshold: f64,
    /// Discrete swipes older than this are ignored.
    pub max_swipe_ms: f64,
    /// Drag progress at which release snaps open instead of closed.
    pub snap_threshold: f64,
    /// px/ms past which a short movement still counts as a swipe.
    pub flick_velocity: f64,
    pub flick_distance: f64,
}

impl Default for GestureConfig {
    fn default() -> Self {
        Self {
            swipe_threshold: 50.0,
            edge_threshold: 50.0,
            vertical_threshold: 30.0,
            drag_follow_threshold: 10.0,
            max_swipe_ms: 300.0,
            snap_threshold: 0.4,
            flick_velocity: 0.8,
            flick_distance: 30.0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum TouchMove {
    Ignored,
    Drag { progress: f64 },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GestureOutcome {
    None,
    Open,
    Close,
}

/// Tracks one touch sequence against the drawer. Arms on touch-start only
/// when the touch can mean something for the drawer (edge zone while closed,
/// anywhere while open, never on scrollable content away from the edge),
/// then either follows the finger once horizontal movement is clear, or
/// falls back to discrete swipe classification on release.
#[derive(Clone, Debug, PartialEq)]
pub struct SwipeTracker {
    config: GestureConfig,
    start_x: f64,
    start_y: f64,
    start_ms: f64,
    last_y: f64,
    armed: bool,
    dragging: bool,
    progress: f64,
    open_at_start: bool,
}

impl SwipeTracker {
    pub fn new(config: GestureConfig) -> Self {
        Self {
            config,
            start_x: 0.0,
            start_y: 0.0,
            start_ms: 0.0,
            last_y: 0.0,
            armed: false,
            dragging: false,
            progress: 0.0,
            open_at_start: false,
        }
    }

    pub fn is_dragging(&self) -> bool {
        self.dragging
    }

    pub fn touch_start(
        &mut self,
        x: f64,
        y: f64,
        now_ms: f64,
        drawer_open: bool,
        on_scrollable: bool,
    ) -> bool {
        self.reset();
        let edge = x <= self.config.edge_threshold;
        if !drawer_open && !edge {
            return false;
        }
        if on_scrollable && !edge {
            return false;
        }
        self.armed = true;
        self.start_x = x;
        self.start_y = y;
        self.last_y = y;
        self.start_ms = now_ms;
        self.open_at_start = drawer_open;
        true
    }

    pub fn touch_move(&mut self, x: f64, y: f64, drawer_width: f64) -> TouchMove {
        if !self.armed {
            return TouchMove::Ignored;
        }
        self.last_y = y;
        let delta_x = x - self.start_x;
        let delta_y = (y - self.start_y).abs();

        if !self.dragging {
            if delta_y > self.config.vertical_threshold {
                // Looks like a scroll; give the touch back to the page.
                self.armed = false;
                return TouchMove::Ignored;
            }
            if delta_x.abs() <= self.config.drag_follow_threshold {
                return TouchMove::Ignored;
            }
            let opening = !self.open_at_start
                && delta_x > 0.0
                && self.start_x <= self.config.edge_threshold;
            let closing = self.open_at_start && delta_x < 0.0;
            if !(opening || closing) {
                return TouchMove::Ignored;
            }
            self.dragging = true;
        }

        let width = drawer_width.max(1.0);
        self.progress = if self.open_at_start {
            (1.0 + delta_x / width).clamp(0.0, 1.0)
        } else {
            (delta_x / width).clamp(0.0, 1.0)
        };
        TouchMove::Drag {
            progress: self.progress,
        }
    }

    pub fn touch_end(&mut self, x: f64, now_ms: f64) -> GestureOutcome {
        let outcome = self.classify_end(x, now_ms);
        self.reset();
        outcome
    }

    pub fn touch_cancel(&mut self) {
        self.reset();
    }

    fn classify_end(&self, x: f64, now_ms: f64) -> GestureOutcome {
        if !self.armed {
            return GestureOutcome::None;
        }
        if self.dragging {
            return if self.progress >= self.config.snap_threshold {
                GestureOutcome::Open
            } else {
                GestureOutcome::Close
            };
        }

        let distance = x - self.start_x;
        let vertical = (self.last_y - self.start_y).abs();
        if vertical > self.config.vertical_threshold {
            return GestureOutcome::None;
        }
        let elapsed = now_ms - self.start_ms;
        if elapsed > self.config.max_swipe_ms {
            return GestureOutcome::None;
        }

        let from_edge = self.start_x <= self.config.edge_threshold;
        if distance > self.config.swipe_threshold && from_edge && !self.open_at_start {
            return GestureOutcome::Open;
        }
        if distance < -self.config.swipe_threshold && self.open_at_start {
            return GestureOutcome::Close;
        }

        // High velocity lets a shorter movement through.
        let velocity = distance.abs() / elapsed;
        if velocity > self.config.flick_velocity {
            if distance > self.config.flick_distance && from_edge && !self.open_at_start {
                return GestureOutcome::Open;
            }
            if distance < -self.config.flick_distance && self.open_at_start {
                return GestureOutcome::Close;
            }
        }
        GestureOutcome::None
    }

    fn reset(&mut self) {
        self.armed = false;
        self.dragging = false;
        self.progress = 0.0;
    }
}

#[derive(Clone, Copy)]
pub struct SidebarControl {
    pub open: RwSignal<bool>,
}

impl SidebarControl {
    pub fn provide() -> Self {
        let control = Self {
            open: RwSignal::new(false),
        };
        provide_context(control);
        control
    }

    pub fn toggle(self) {
        self.open.update(|open| *open = !*open);
    }
}

fn sidebar_element() -> Option<web_sys::HtmlElement> {
    document()
        .query_selector(".sidebar")
        .ok()
        .flatten()?
        .dyn_into()
        .ok()
}

fn apply_drag_transform(progress: f64) {
    let Some(el) = sidebar_element() else { return };
    let width = el.offset_width() as f64;
    let style = el.style();
    let _ = style.set_property(
        "transform",
        &format!("translateX({}px)", (progress - 1.0) * width),
    );
    if progress > 0.3 {
        let _ = style.set_property("box-shadow", "2px 0 8px rgba(0, 0, 0, 0.2)");
    } else {
        let _ = style.remove_property("box-shadow");
    }
}

fn clear_drag_transform() {
    let Some(el) = sidebar_element() else { return };
    let style = el.style();
    let _ = style.remove_property("transform");
    let _ = style.remove_property("box-shadow");
}

/// Walks up from a touch target looking for something that scrolls on its
/// own, so horizontal pans inside code blocks and wide tables keep working.
fn find_scrollable_parent(start: &web_sys::Element) -> Option<web_sys::Element> {
    let body = document().body();
    let mut current = Some(start.clone());
    while let Some(el) = current {
        if let Some(body) = &body {
            if el.is_same_node(Some(body.as_ref())) {
                return None;
            }
        }
        if let Ok(Some(style)) = window().get_computed_style(&el) {
            let overflow_x = style.get_property_value("overflow-x").unwrap_or_default();
            let overflow_y = style.get_property_value("overflow-y").unwrap_or_default();
            let scrollable_style = matches!(overflow_x.as_str(), "auto" | "scroll")
                || matches!(overflow_y.as_str(), "auto" | "scroll");
            if scrollable_style
                && (el.scroll_width() > el.client_width()
                    || el.scroll_height() > el.client_height())
            {
                return Some(el);
            }
        }
        let tag = el.tag_name();
        if tag == "PRE"
            || tag == "CODE"
            || tag == "TEXTAREA"
            || el.class_list().contains("breadcrumbs-path")
        {
            return Some(el);
        }
        current = el.parent_element();
    }
    None
}

fn viewport_width() -> f64 {
    window()
        .inner_width()
        .ok()
        .and_then(|w| w.as_f64())
        .unwrap_or(0.0)
}

fn drawer_width() -> f64 {
    sidebar_element().map(|el| el.offset_width() as f64).unwrap_or(0.0)
}

fn wire_document_gestures(control: SidebarControl) {
    let doc = document();
    let tracker = Rc::new(RefCell::new(SwipeTracker::new(GestureConfig::default())));

    let on_touch_start = {
        let tracker = Rc::clone(&tracker);
        Closure::<dyn FnMut(web_sys::TouchEvent)>::new(move |ev: web_sys::TouchEvent| {
            if ev.touches().length() != 1 {
                return;
            }
            let Some(touch) = ev.touches().get(0) else { return };
            let on_scrollable = ev
                .target()
                .and_then(|target| target.dyn_into::<web_sys::Element>().ok())
                .map(|el| find_scrollable_parent(&el).is_some())
                .unwrap_or(false);
            tracker.borrow_mut().touch_start(
                touch.client_x() as f64,
                touch.client_y() as f64,
                js_sys::Date::now(),
                control.open.get_untracked(),
                on_scrollable,
            );
        })
    };
    let _ = doc.add_event_listener_with_callback(
        "touchstart",
        on_touch_start.as_ref().unchecked_ref(),
    );
    on_touch_start.forget();

    let on_touch_move = {
        let tracker = Rc::clone(&tracker);
        Closure::<dyn FnMut(web_sys::TouchEvent)>::new(move |ev: web_sys::TouchEvent| {
            if ev.touches().length() != 1 {
                return;
            }
            let Some(touch) = ev.touches().get(0) else { return };
            let width = drawer_width();
            if width <= 0.0 {
                return;
            }
            let update = tracker.borrow_mut().touch_move(
                touch.client_x() as f64,
                touch.client_y() as f64,
                width,
            );
            if let TouchMove::Drag { progress } = update {
                // Drag-follow owns this touch; the page must not scroll.
                ev.prevent_default();
                apply_drag_transform(progress);
            }
        })
    };
    let options = web_sys::AddEventListenerOptions::new();
    options.set_passive(false);
    let _ = doc.add_event_listener_with_callback_and_add_event_listener_options(
        "touchmove",
        on_touch_move.as_ref().unchecked_ref(),
        &options,
    );
    on_touch_move.forget();

    let on_touch_end = {
        let tracker = Rc::clone(&tracker);
        Closure::<dyn FnMut(web_sys::TouchEvent)>::new(move |ev: web_sys::TouchEvent| {
            if ev.changed_touches().length() != 1 {
                return;
            }
            let Some(touch) = ev.changed_touches().get(0) else { return };
            match tracker
                .borrow_mut()
                .touch_end(touch.client_x() as f64, js_sys::Date::now())
            {
                GestureOutcome::Open => control.open.set(true),
                GestureOutcome::Close => control.open.set(false),
                GestureOutcome::None => {}
            }
            clear_drag_transform();
        })
    };
    let _ = doc.add_event_listener_with_callback("touchend", on_touch_end.as_ref().unchecked_ref());
    on_touch_end.forget();

    let on_touch_cancel = {
        let tracker = Rc::clone(&tracker);
        Closure::<dyn FnMut(web_sys::TouchEvent)>::new(move |_ev: web_sys::TouchEvent| {
            tracker.borrow_mut().touch_cancel();
            clear_drag_transform();
        })
    };
    let _ = doc.add_event_listener_with_callback(
        "touchcancel",
        on_touch_cancel.as_ref().unchecked_ref(),
    );
    on_touch_cancel.forget();

    let on_click = Closure::<dyn FnMut(web_sys::MouseEvent)>::new(move |ev: web_sys::MouseEvent| {
        if !control.open.get_untracked() {
            return;
        }
        let Some(target) = ev
            .target()
            .and_then(|target| target.dyn_into::<web_sys::Element>().ok())
        else {
            return;
        };
        let inside_sidebar = target.closest(".sidebar").ok().flatten().is_some();
        let on_hamburger = target.closest(".hamburger").ok().flatten().is_some();
        if !inside_sidebar && !on_hamburger {
            control.open.set(false);
        }
    });
    let _ = doc.add_event_listener_with_callback("click", on_click.as_ref().unchecked_ref());
    on_click.forget();
}

#[component]
pub fn Sidebar() -> impl IntoView {
    let control = expect_context::<SidebarControl>();
    let client = expect_context::<ApiClient>();
    let nav_items = RwSignal::new(Vec::<FolderEntry>::new());

    wire_document_gestures(control);

    {
        let client = client.clone();
        Effect::new(move |_| {
            let client = client.clone();
            spawn_local(async move {
                match client.list_folders().await {
                    Ok(folders) => nav_items.set(folders),
                    Err(err) => leptos::logging::error!("failed to load navigation: {err}"),
                }
            });
        });
    }

    view! {
        <nav class="sidebar" class:active=move || control.open.get()>
            <div class="nav-items">
                {move || {
                    nav_items
                        .get()
                        .into_iter()
                        .map(|folder| {
                            view! {
                                <a
                                    class="nav-item"
                                    href=folder.path.clone()
                                    style:padding-left=format!("{}px", folder.level * 16 + 12)
                                    on:click=move |_| {
                                        if viewport_width() <= 768.0 {
                                            control.open.set(false);
                                        }
                                    }
                                >
                                    {folder.name}
                                </a>
                            }
                        })
                        .collect::<Vec<_>>()
                }}
            </div>
        </nav>
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> SwipeTracker {
        SwipeTracker::new(GestureConfig::default())
    }

    #[test]
    fn touch_outside_the_edge_zone_never_arms_a_closed_drawer() {
        let mut t = tracker();
        assert!(!t.touch_start(200.0, 100.0, 0.0, false, false));
        assert_eq!(t.touch_move(300.0, 100.0, 280.0), TouchMove::Ignored);
        assert_eq!(t.touch_end(300.0, 100.0), GestureOutcome::None);
    }

    #[test]
    fn edge_drag_progress_follows_the_finger_monotonically() {
        let mut t = tracker();
        assert!(t.touch_start(20.0, 100.0, 0.0, false, false));

        // Below the follow threshold: nothing yet.
        assert_eq!(t.touch_move(28.0, 100.0, 280.0), TouchMove::Ignored);

        let mut last = 0.0;
        for x in [60.0, 120.0, 200.0, 320.0] {
            match t.touch_move(x, 102.0, 280.0) {
                TouchMove::Drag { progress } => {
                    assert!(progress >= last, "progress went backwards at x={x}");
                    assert!((0.0..=1.0).contains(&progress));
                    last = progress;
                }
                TouchMove::Ignored => panic!("drag did not engage at x={x}"),
            }
        }
        assert_eq!(last, 1.0);
    }

    #[test]
    fn vertical_movement_aborts_recognition() {
        let mut t = tracker();
        assert!(t.touch_start(20.0, 100.0, 0.0, false, false));
        assert_eq!(t.touch_move(40.0, 150.0, 280.0), TouchMove::Ignored);
        // The sequence stays dead even if the finger straightens out.
        assert_eq!(t.touch_move(120.0, 150.0, 280.0), TouchMove::Ignored);
        assert_eq!(t.touch_end(120.0, 200.0), GestureOutcome::None);
    }

    #[test]
    fn release_snaps_by_drag_progress() {
        let mut t = tracker();
        t.touch_start(10.0, 100.0, 0.0, false, false);
        t.touch_move(150.0, 100.0, 280.0);
        assert_eq!(t.touch_end(150.0, 400.0), GestureOutcome::Open);

        let mut t = tracker();
        t.touch_start(10.0, 100.0, 0.0, false, false);
        t.touch_move(70.0, 100.0, 280.0);
        assert_eq!(t.touch_end(70.0, 400.0), GestureOutcome::Close);
    }

    #[test]
    fn closing_drag_snaps_closed_past_the_threshold() {
        let mut t = tracker();
        t.touch_start(250.0, 100.0, 0.0, true, false);
        // Dragged most of the way shut: progress well below 0.4.
        t.touch_move(40.0, 100.0, 280.0);
        assert_eq!(t.touch_end(40.0, 400.0), GestureOutcome::Close);

        let mut t = tracker();
        t.touch_start(250.0, 100.0, 0.0, true, false);
        // Barely moved: stays open.
        t.touch_move(230.0, 100.0, 280.0);
        assert_eq!(t.touch_end(230.0, 400.0), GestureOutcome::Open);
    }

    #[test]
    fn discrete_swipe_from_the_edge_opens() {
        let mut t = tracker();
        t.touch_start(10.0, 100.0, 0.0, false, false);
        assert_eq!(t.touch_end(70.0, 120.0), GestureOutcome::Open);
    }

    #[test]
    fn short_but_fast_flick_still_counts() {
        let mut t = tracker();
        t.touch_start(10.0, 100.0, 0.0, false, false);
        // 40 px in 40 ms: under the distance threshold, over the velocity one.
        assert_eq!(t.touch_end(50.0, 40.0), GestureOutcome::Open);
    }

    #[test]
    fn slow_swipe_is_ignored() {
        let mut t = tracker();
        t.touch_start(10.0, 100.0, 0.0, false, false);
        assert_eq!(t.touch_end(80.0, 500.0), GestureOutcome::None);
    }

    #[test]
    fn left_swipe_closes_an_open_drawer() {
        let mut t = tracker();
        t.touch_start(200.0, 100.0, 0.0, true, false);
        assert_eq!(t.touch_end(120.0, 150.0), GestureOutcome::Close);
    }

    #[test]
    fn scrollable_target_away_from_the_edge_is_left_alone() {
        let mut t = tracker();
        assert!(!t.touch_start(120.0, 100.0, 0.0, true, true));
        // From the edge the drawer still wins, even over scrollable content.
        assert!(t.touch_start(30.0, 100.0, 0.0, false, true));
    }
}
