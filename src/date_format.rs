use chrono::{Datelike, NaiveDateTime, Timelike};

/// Formats a local date-time the way `Date.prototype.toLocaleString` does for
/// the locales quiz pages are served in. Unknown locales use `en-US`.
pub fn format_locale_date_time(value: &NaiveDateTime, locale: &str) -> String {
    let (year, month, day) = (value.year(), value.month(), value.day());
    let (hour, minute, second) = (value.hour(), value.minute(), value.second());

    match locale_family(locale) {
        "de" | "ru" | "pl" | "fi" | "nb" => {
            format!("{day}.{month}.{year}, {hour:02}:{minute:02}:{second:02}")
        }
        "fr" | "es" | "it" | "pt" => {
            format!("{day:02}/{month:02}/{year} {hour:02}:{minute:02}:{second:02}")
        }
        "ja" | "zh" => format!("{year}/{month}/{day} {hour}:{minute:02}:{second:02}"),
        "en" if !default_hour12(locale) => {
            format!("{day:02}/{month:02}/{year}, {hour:02}:{minute:02}:{second:02}")
        }
        _ => {
            let period = if hour < 12 { "AM" } else { "PM" };
            let hour12 = match hour % 12 {
                0 => 12,
                other => other,
            };
            format!("{month}/{day}/{year}, {hour12}:{minute:02}:{second:02} {period}")
        }
    }
}

fn locale_family(locale: &str) -> &str {
    locale.split(['-', '_']).next().unwrap_or_default()
}

fn locale_region(locale: &str) -> Option<&str> {
    locale
        .split(['-', '_'])
        .skip(1)
        .find(|subtag| subtag.len() == 2 && subtag.chars().all(|ch| ch.is_ascii_alphabetic()))
}

fn default_hour12(locale: &str) -> bool {
    if locale_family(locale) != "en" {
        return false;
    }
    !matches!(
        locale_region(locale).map(|region| region.to_ascii_uppercase()).as_deref(),
        Some("GB" | "IE")
    )
}
