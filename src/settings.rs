#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TransportMode {
    /// One JSON answer per question (`POST /chat`).
    #[default]
    Whole,
    /// Incremental text answer (`POST /chat/stream`).
    Streaming,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FontSize {
    #[default]
    Small,
    Medium,
    Large,
}

impl FontSize {
    pub const ALL: [FontSize; 3] = [Self::Small, Self::Medium, Self::Large];

    pub fn label(self) -> &'static str {
        match self {
            Self::Small => "Small",
            Self::Medium => "Medium",
            Self::Large => "Large",
        }
    }

    /// Body text size in points.
    pub fn body_points(self) -> f32 {
        match self {
            Self::Small => 14.0,
            Self::Medium => 16.0,
            Self::Large => 18.0,
        }
    }
}

/// Cosmetic and transport preferences for one window.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Settings {
    pub dark_mode: bool,
    pub sound_enabled: bool,
    pub font_size: FontSize,
    pub sidebar_open: bool,
    pub transport: TransportMode,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            dark_mode: false,
            sound_enabled: true,
            font_size: FontSize::Small,
            sidebar_open: false,
            transport: TransportMode::Whole,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConnectionStatus {
    #[default]
    Online,
    Connecting,
    Offline,
}

impl ConnectionStatus {
    pub fn label(self) -> &'static str {
        match self {
            Self::Online => "Online",
            Self::Connecting => "Connecting...",
            Self::Offline => "Offline",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_first_launch() {
        let settings = Settings::default();

        assert!(!settings.dark_mode);
        assert!(settings.sound_enabled);
        assert_eq!(settings.font_size, FontSize::Small);
        assert!(!settings.sidebar_open);
        assert_eq!(settings.transport, TransportMode::Whole);
        assert_eq!(ConnectionStatus::default(), ConnectionStatus::Online);
    }

    #[test]
    fn font_sizes_grow() {
        let points: Vec<f32> = FontSize::ALL.iter().map(|size| size.body_points()).collect();
        assert!(points.windows(2).all(|pair| pair[0] < pair[1]));
    }
}
