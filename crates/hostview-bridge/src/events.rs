//! Lifecycle events and the script handlers they are forwarded to

use std::fmt;
use std::str::FromStr;

/// An event raised by the native runtime
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// Navigation started loading
    LoadStarted,
    /// Navigation finished loading
    LoadFinished,
    /// The document is ready
    DomReady,
    /// Document title changed
    TitleChanged(String),
    /// Current URI changed
    UriChanged(String),
    /// The user asked to close the window
    CloseRequested,
    /// Window gained (`true`) or lost focus
    FocusChanged(bool),
    /// Window was resized
    Resized {
        /// New width in pixels
        width: u32,
        /// New height in pixels
        height: u32,
    },
}

/// Script-side handler slot an event is forwarded to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandlerSlot {
    /// `webview_on_close`
    Close,
    /// `webview_on_resize`
    Resize,
    /// `webview_on_focus`
    Focus,
    /// `webview_on_dom_ready`
    DomReady,
    /// `webview_on_load`
    Load,
    /// `webview_on_navigate`
    Navigate,
    /// `webview_on_title`
    Title,
}

impl HandlerSlot {
    /// Every slot
    pub const ALL: [HandlerSlot; 7] = [
        HandlerSlot::Close,
        HandlerSlot::Resize,
        HandlerSlot::Focus,
        HandlerSlot::DomReady,
        HandlerSlot::Load,
        HandlerSlot::Navigate,
        HandlerSlot::Title,
    ];

    /// Suffix of the `webview_on_*` registration function
    pub fn ident(self) -> &'static str {
        match self {
            HandlerSlot::Close => "close",
            HandlerSlot::Resize => "resize",
            HandlerSlot::Focus => "focus",
            HandlerSlot::DomReady => "dom_ready",
            HandlerSlot::Load => "load",
            HandlerSlot::Navigate => "navigate",
            HandlerSlot::Title => "title",
        }
    }
}

impl LifecycleEvent {
    /// Handler slots this event is forwarded to, each with its payload.
    ///
    /// A finished load also counts as the document becoming ready.
    pub fn routes(&self) -> Vec<(HandlerSlot, Option<String>)> {
        match self {
            LifecycleEvent::LoadStarted => vec![(HandlerSlot::Load, Some("started".to_string()))],
            LifecycleEvent::LoadFinished => vec![
                (HandlerSlot::Load, Some("finished".to_string())),
                (HandlerSlot::DomReady, None),
            ],
            LifecycleEvent::DomReady => vec![(HandlerSlot::DomReady, None)],
            LifecycleEvent::TitleChanged(title) => vec![(HandlerSlot::Title, Some(title.clone()))],
            LifecycleEvent::UriChanged(uri) => vec![(HandlerSlot::Navigate, Some(uri.clone()))],
            LifecycleEvent::CloseRequested => vec![(HandlerSlot::Close, None)],
            LifecycleEvent::FocusChanged(focused) => {
                vec![(HandlerSlot::Focus, Some(focused.to_string()))]
            }
            LifecycleEvent::Resized { width, height } => {
                vec![(HandlerSlot::Resize, Some(format!("{}x{}", width, height)))]
            }
        }
    }
}

/// Error parsing an event description
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unrecognized event '{0}'")]
pub struct ParseEventError(String);

impl FromStr for LifecycleEvent {
    type Err = ParseEventError;

    /// Parse `kind` or `kind:argument`, e.g. `load-started`, `title:Home`,
    /// `focus:true`, `resize:800x600`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || ParseEventError(s.to_string());
        let (kind, arg) = match s.split_once(':') {
            Some((kind, arg)) => (kind, Some(arg)),
            None => (s, None),
        };

        let event = match (kind, arg) {
            ("load-started", None) => LifecycleEvent::LoadStarted,
            ("load-finished", None) => LifecycleEvent::LoadFinished,
            ("dom-ready", None) => LifecycleEvent::DomReady,
            ("close", None) => LifecycleEvent::CloseRequested,
            ("title", Some(title)) => LifecycleEvent::TitleChanged(title.to_string()),
            ("navigate", Some(uri)) => LifecycleEvent::UriChanged(uri.to_string()),
            ("focus", Some(flag)) => LifecycleEvent::FocusChanged(flag.parse().map_err(|_| bad())?),
            ("resize", Some(size)) => {
                let (w, h) = size.split_once('x').ok_or_else(bad)?;
                LifecycleEvent::Resized {
                    width: w.parse().map_err(|_| bad())?,
                    height: h.parse().map_err(|_| bad())?,
                }
            }
            _ => return Err(bad()),
        };
        Ok(event)
    }
}

impl fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleEvent::LoadStarted => write!(f, "load-started"),
            LifecycleEvent::LoadFinished => write!(f, "load-finished"),
            LifecycleEvent::DomReady => write!(f, "dom-ready"),
            LifecycleEvent::TitleChanged(t) => write!(f, "title:{}", t),
            LifecycleEvent::UriChanged(u) => write!(f, "navigate:{}", u),
            LifecycleEvent::CloseRequested => write!(f, "close"),
            LifecycleEvent::FocusChanged(b) => write!(f, "focus:{}", b),
            LifecycleEvent::Resized { width, height } => write!(f, "resize:{}x{}", width, height),
        }
    }
}

/// Script function names registered for each handler slot
#[derive(Debug, Clone, Default)]
pub struct EventHandlers {
    on_close: Option<String>,
    on_resize: Option<String>,
    on_focus: Option<String>,
    on_dom_ready: Option<String>,
    on_load: Option<String>,
    on_navigate: Option<String>,
    on_title: Option<String>,
}

impl EventHandlers {
    fn slot_mut(&mut self, slot: HandlerSlot) -> &mut Option<String> {
        match slot {
            HandlerSlot::Close => &mut self.on_close,
            HandlerSlot::Resize => &mut self.on_resize,
            HandlerSlot::Focus => &mut self.on_focus,
            HandlerSlot::DomReady => &mut self.on_dom_ready,
            HandlerSlot::Load => &mut self.on_load,
            HandlerSlot::Navigate => &mut self.on_navigate,
            HandlerSlot::Title => &mut self.on_title,
        }
    }

    /// Handler currently registered for `slot`
    pub fn get(&self, slot: HandlerSlot) -> Option<&str> {
        let handler = match slot {
            HandlerSlot::Close => &self.on_close,
            HandlerSlot::Resize => &self.on_resize,
            HandlerSlot::Focus => &self.on_focus,
            HandlerSlot::DomReady => &self.on_dom_ready,
            HandlerSlot::Load => &self.on_load,
            HandlerSlot::Navigate => &self.on_navigate,
            HandlerSlot::Title => &self.on_title,
        };
        handler.as_deref()
    }

    /// Replace the handler for `slot`; an empty name clears it
    pub fn set(&mut self, slot: HandlerSlot, function: String) {
        *self.slot_mut(slot) = if function.is_empty() {
            None
        } else {
            Some(function)
        };
    }
}
