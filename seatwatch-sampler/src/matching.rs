//! Mapping probe results onto known screens
//!
//! Vendors name auditoriums inconsistently ("Saal 3", "SAAL 3 (Dolby)",
//! "Kino 3"), so name matching falls through three passes of decreasing
//! strictness. Ambiguous fuzzy matches resolve to nothing.

use seatwatch_common::db::Screen;

/// Resolve an auditorium name to one of the venue's screens
///
/// 1. exact name
/// 2. normalized name (case, punctuation and spacing ignored), then a
///    unique screen sharing the first number in the name
/// 3. unique screen whose normalized name contains, or is contained in,
///    the observed one
pub fn match_screen_by_name<'a>(screens: &'a [Screen], auditorium: &str) -> Option<&'a Screen> {
    if let Some(screen) = screens.iter().find(|s| s.name == auditorium) {
        return Some(screen);
    }

    let wanted = normalize(auditorium);
    if wanted.is_empty() {
        return None;
    }

    if let Some(screen) = screens.iter().find(|s| normalize(&s.name) == wanted) {
        return Some(screen);
    }

    if let Some(number) = first_number(auditorium) {
        if let Some(screen) = unique(screens.iter().filter(|s| first_number(&s.name) == Some(number))) {
            return Some(screen);
        }
    }

    unique(screens.iter().filter(|s| {
        let name = normalize(&s.name);
        !name.is_empty() && (name.contains(&wanted) || wanted.contains(&name))
    }))
}

/// Screen for a confirmed seat count: exact, else nearest above, else nearest below
pub fn screen_for_capacity(screens: &[Screen], capacity: i64) -> Option<&Screen> {
    if let Some(screen) = screens.iter().find(|s| s.seat_count == capacity) {
        return Some(screen);
    }

    screens
        .iter()
        .filter(|s| s.seat_count > capacity)
        .min_by_key(|s| s.seat_count)
        .or_else(|| {
            screens
                .iter()
                .filter(|s| s.seat_count < capacity)
                .max_by_key(|s| s.seat_count)
        })
}

fn normalize(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

fn first_number(name: &str) -> Option<u32> {
    let digits: String = name
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

fn unique<'a>(mut candidates: impl Iterator<Item = &'a Screen>) -> Option<&'a Screen> {
    let first = candidates.next()?;
    match candidates.next() {
        Some(_) => None,
        None => Some(first),
    }
}
