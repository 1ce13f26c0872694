use crate::model::{Item, ItemStatus};

/// Two-bucket status selector. `Stopped` means "anything not running",
/// so paused or suspended machines land there too.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StatusFilter {
    #[default]
    All,
    Running,
    Stopped,
}

impl StatusFilter {
    pub fn cycle(self) -> Self {
        match self {
            Self::All => Self::Running,
            Self::Running => Self::Stopped,
            Self::Stopped => Self::All,
        }
    }

    pub fn matches(&self, status: &ItemStatus) -> bool {
        match self {
            Self::All => true,
            Self::Running => status.is_running(),
            Self::Stopped => !status.is_running(),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::All => "ALL",
            Self::Running => "RUNNING",
            Self::Stopped => "STOPPED",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "all" => Some(Self::All),
            "running" | "online" => Some(Self::Running),
            "stopped" | "offline" => Some(Self::Stopped),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FilterState {
    pub search_text: String,
    pub status_filter: StatusFilter,
}

impl FilterState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_search(mut self, text: impl Into<String>) -> Self {
        self.search_text = text.into();
        self
    }

    pub fn with_status(mut self, status_filter: StatusFilter) -> Self {
        self.status_filter = status_filter;
        self
    }

    pub fn clear(&mut self) {
        self.search_text.clear();
        self.status_filter = StatusFilter::All;
    }

    pub fn cycle_status(&mut self) {
        self.status_filter = self.status_filter.cycle();
    }

    pub fn label(&self) -> String {
        if self.search_text.is_empty() {
            self.status_filter.label().to_string()
        } else {
            format!("{} /{}/", self.status_filter.label(), self.search_text)
        }
    }
}

/// Case-insensitive substring match against the name or the decimal id.
fn matches_text(item: &Item, needle: &str) -> bool {
    if needle.is_empty() {
        return true;
    }
    let needle = needle.to_lowercase();
    item.name.to_lowercase().contains(&needle) || item.id.to_string().contains(&needle)
}

pub fn matches(item: &Item, filter: &FilterState) -> bool {
    matches_text(item, &filter.search_text) && filter.status_filter.matches(&item.status)
}

pub fn has_active_filters(filter: &FilterState) -> bool {
    !filter.search_text.is_empty() || filter.status_filter != StatusFilter::All
}
