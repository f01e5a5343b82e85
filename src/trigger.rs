//! # Trigger Parser
//!
//! Recognizes the `<trigger><positionToken><revealedChars>*<terminator>`
//! grammar over a stream of keystrokes in the search field, without ever
//! showing the secret on screen.
//!
//! Modeled as a pure step function over a field state: whatever input
//! mechanism the hosting platform offers feeds [`FieldState::step`] one
//! [`KeyEvent`] at a time and renders the returned visible text. Protocol
//! events feed the session machine in [`crate::session`].
use rand::{Rng, seq::SliceRandom};

use crate::{
    pages::clean_page_ref,
    profiles::{Profile, ProfileSet},
};

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum KeyEvent {
    Char(char),
    Backspace,
    /// Space or apostrophe.
    Terminator(char),
}

#[derive(Clone, Debug, PartialEq)]
pub enum ProtocolEvent {
    SessionStart {
        profile: String,
        trigger: String,
        covert_page: String,
    },
    SessionUpdate {
        /// One-based wire position decoded from the position token.
        position: u32,
        reveal_word: String,
    },
    SessionCancel,
}

#[derive(Clone, Debug)]
struct Capture {
    profile: String,
    trigger: String,
    /// Everything consumed since the trigger matched, trigger included.
    raw_typed: String,
    /// Cleaned, lowercased covert page shown instead of the secret.
    covert_page: String,
    instant_replace: bool,
}

impl Capture {
    fn display(&self) -> String {
        if self.instant_replace {
            self.raw_typed.clone()
        } else {
            covert_prefix(&self.covert_page, self.raw_typed.chars().count())
        }
    }
}

/// State of the search field, durable across keystrokes.
#[derive(Clone, Debug, Default)]
pub struct FieldState {
    /// What the text field currently shows.
    pub visible: String,
    capture: Option<Capture>,
}

impl FieldState {
    pub fn capturing(&self) -> bool {
        self.capture.is_some()
    }

    /// Processes one keystroke, updating the visible text and possibly
    /// emitting a protocol event for the session machine.
    pub fn step(
        &mut self,
        event: KeyEvent,
        profiles: &ProfileSet,
        rng: &mut impl Rng,
    ) -> Option<ProtocolEvent> {
        match self.capture.take() {
            Some(capture) => self.step_capturing(capture, event),
            None => self.step_idle(event, profiles, rng),
        }
    }

    fn step_idle(
        &mut self,
        event: KeyEvent,
        profiles: &ProfileSet,
        rng: &mut impl Rng,
    ) -> Option<ProtocolEvent> {
        match event {
            KeyEvent::Char(c) => {
                // Trigger matching anchors to the start of the field.
                let prospective = format!("{}{c}", self.visible);
                if let Some((name, profile, trigger)) = match_trigger(&prospective, profiles) {
                    if let Some(covert) = profile.coverts.choose(rng) {
                        let capture = Capture {
                            profile: name.clone(),
                            trigger: trigger.clone(),
                            raw_typed: trigger.clone(),
                            covert_page: clean_page_ref(covert),
                            instant_replace: profile.instant_replace,
                        };
                        self.visible = capture.display();
                        let event = ProtocolEvent::SessionStart {
                            profile: name,
                            trigger,
                            covert_page: capture.covert_page.clone(),
                        };
                        self.capture = Some(capture);
                        return Some(event);
                    }
                }
                self.visible.push(c);
                None
            }
            KeyEvent::Backspace => {
                self.visible.pop();
                None
            }
            KeyEvent::Terminator(t) => {
                self.visible.push(t);
                None
            }
        }
    }

    fn step_capturing(&mut self, mut capture: Capture, event: KeyEvent) -> Option<ProtocolEvent> {
        match event {
            KeyEvent::Char(c) => {
                capture.raw_typed.push(c);
                self.visible = capture.display();
                self.capture = Some(capture);
                None
            }
            KeyEvent::Backspace => {
                capture.raw_typed.pop();
                if capture.raw_typed.is_empty() {
                    // erased past the trigger boundary: cancel outright
                    self.visible.clear();
                    return Some(ProtocolEvent::SessionCancel);
                }
                self.visible = capture.display();
                self.capture = Some(capture);
                None
            }
            KeyEvent::Terminator(t) => {
                let after = capture
                    .raw_typed
                    .strip_prefix(capture.trigger.as_str())
                    .unwrap_or("");
                let (position, revealed) = decode_after_trigger(after);

                if capture.instant_replace && t == ' ' {
                    if revealed.is_empty() {
                        // incomplete pattern: the space passes through
                        self.visible = format!("{} ", capture.raw_typed);
                    } else {
                        // full substitution disguises what was typed
                        self.visible = capture.covert_page.to_lowercase();
                    }
                } else if t == ' ' {
                    // the confirming space itself is never shown
                    self.visible =
                        covert_prefix(&capture.covert_page, capture.raw_typed.chars().count());
                } else {
                    self.visible = format!(
                        "{}{t}",
                        covert_prefix(&capture.covert_page, capture.raw_typed.chars().count())
                    );
                }

                Some(ProtocolEvent::SessionUpdate {
                    position,
                    reveal_word: revealed.to_string(),
                })
            }
        }
    }
}

/// First registered trigger the prospective field content starts with.
/// Ties are impossible: the profile store keeps triggers globally unique.
fn match_trigger<'a>(
    prospective: &str,
    profiles: &'a ProfileSet,
) -> Option<(String, &'a Profile, String)> {
    for (name, profile) in &profiles.profiles {
        for trigger in &profile.triggers {
            if !trigger.is_empty() && prospective.starts_with(trigger.as_str()) {
                return Some((name.clone(), profile, trigger.clone()));
            }
        }
    }
    None
}

/// Decodes `<positionToken><revealedChars>` from the text after the
/// trigger. A single letter a-f (case-insensitive, mapped 1..6) wins over a
/// digit run; position defaults to 1 when no token is present.
fn decode_after_trigger(after: &str) -> (u32, &str) {
    if let Some(first) = after.chars().next() {
        let lower = first.to_ascii_lowercase();
        if first.is_ascii_alphabetic() && ('a'..='f').contains(&lower) {
            let position = (lower as u32 - 'a' as u32) + 1;
            return (position, reveal_run(&after[first.len_utf8()..]));
        }
    }

    let digits = after.chars().take_while(char::is_ascii_digit).count();
    if digits > 0 {
        let position = after[..digits].parse().unwrap_or(1);
        return (position, reveal_run(&after[digits..]));
    }

    (1, reveal_run(after))
}

/// Maximal non-whitespace run at the start of `rest`.
fn reveal_run(rest: &str) -> &str {
    let end = rest
        .char_indices()
        .find(|(_, c)| c.is_whitespace())
        .map(|(i, _)| i)
        .unwrap_or(rest.len());
    &rest[..end]
}

fn covert_prefix(covert: &str, len: usize) -> String {
    covert.chars().take(len).collect()
}
