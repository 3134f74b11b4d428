//! Gesture and keyboard mapping.

use crate::rendition::{RenditionEvent, SwipeDirection, TapZone};

/// What the reader should do in response to user input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderCommand {
    NextPage,
    PrevPage,
    ShowBars,
    HideBars,
    ToggleBars,
    CycleTheme,
}

/// Map an input event to a command. Non-input events map to nothing.
pub fn command_for(event: &RenditionEvent) -> Option<ReaderCommand> {
    match event {
        RenditionEvent::Swipe(direction) => Some(match direction {
            SwipeDirection::Left => ReaderCommand::NextPage,
            SwipeDirection::Right => ReaderCommand::PrevPage,
            SwipeDirection::Down => ReaderCommand::ShowBars,
            SwipeDirection::Up => ReaderCommand::HideBars,
        }),
        RenditionEvent::Tap(zone) => Some(match zone {
            TapZone::Top => ReaderCommand::ShowBars,
            TapZone::Bottom => ReaderCommand::HideBars,
            TapZone::Left => ReaderCommand::PrevPage,
            TapZone::Right => ReaderCommand::NextPage,
            TapZone::Center => ReaderCommand::ToggleBars,
        }),
        RenditionEvent::Key(key) => match key.as_str() {
            "ArrowLeft" => Some(ReaderCommand::PrevPage),
            "ArrowRight" => Some(ReaderCommand::NextPage),
            "t" | "T" => Some(ReaderCommand::CycleTheme),
            _ => None,
        },
        RenditionEvent::SectionRendered { .. } | RenditionEvent::LocationChanged(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_swipes() {
        assert_eq!(
            command_for(&RenditionEvent::Swipe(SwipeDirection::Left)),
            Some(ReaderCommand::NextPage)
        );
        assert_eq!(
            command_for(&RenditionEvent::Swipe(SwipeDirection::Right)),
            Some(ReaderCommand::PrevPage)
        );
        assert_eq!(
            command_for(&RenditionEvent::Swipe(SwipeDirection::Down)),
            Some(ReaderCommand::ShowBars)
        );
    }

    #[test]
    fn test_keys() {
        assert_eq!(
            command_for(&RenditionEvent::Key("ArrowRight".to_string())),
            Some(ReaderCommand::NextPage)
        );
        assert_eq!(
            command_for(&RenditionEvent::Key("t".to_string())),
            Some(ReaderCommand::CycleTheme)
        );
        assert_eq!(command_for(&RenditionEvent::Key("x".to_string())), None);
    }

    #[test]
    fn test_taps() {
        assert_eq!(
            command_for(&RenditionEvent::Tap(TapZone::Center)),
            Some(ReaderCommand::ToggleBars)
        );
        assert_eq!(
            command_for(&RenditionEvent::Tap(TapZone::Left)),
            Some(ReaderCommand::PrevPage)
        );
    }

    #[test]
    fn test_non_input_events() {
        assert_eq!(
            command_for(&RenditionEvent::SectionRendered { spine_index: 0 }),
            None
        );
    }
}
