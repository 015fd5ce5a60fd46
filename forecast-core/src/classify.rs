//! Maps forecast text and structured weather codes to [`Condition`]s.
//!
//! Both classifiers walk an ordered rule table top to bottom and stop at the
//! first match, so table order is the priority order.

use chrono::{DateTime, Timelike, Utc};
use chrono_tz::Tz;

use crate::{
    model::{Condition, ConditionCategory},
    sources::{SunTimes, WeatherCode},
};

use ConditionCategory::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConditionTemplate {
    pub id: u16,
    pub category: ConditionCategory,
    pub description: &'static str,
    pub icon: &'static str,
}

impl ConditionTemplate {
    const fn new(
        id: u16,
        category: ConditionCategory,
        description: &'static str,
        icon: &'static str,
    ) -> Self {
        Self { id, category, description, icon }
    }

    pub fn condition(&self, description: String, is_daytime: bool) -> Condition {
        Condition {
            id: self.id,
            category: self.category,
            description,
            icon: format!("{}{}", self.icon, if is_daytime { 'd' } else { 'n' }),
            is_daytime,
        }
    }

    fn build(&self, is_daytime: bool) -> Condition {
        self.condition(self.description.to_string(), is_daytime)
    }
}

const THUNDERSTORM: ConditionTemplate = ConditionTemplate::new(211, Thunderstorm, "thunderstorm", "11");
const SLEET: ConditionTemplate = ConditionTemplate::new(611, Sleet, "sleet", "13");
const SNOW: ConditionTemplate = ConditionTemplate::new(601, Snow, "snow", "13");
const DRIZZLE: ConditionTemplate = ConditionTemplate::new(300, Rain, "drizzle", "09");
const SHOWERS: ConditionTemplate = ConditionTemplate::new(521, Rain, "shower rain", "09");
const RAIN: ConditionTemplate = ConditionTemplate::new(501, Rain, "rain", "10");
const FOG: ConditionTemplate = ConditionTemplate::new(741, Fog, "fog", "50");
const MIST: ConditionTemplate = ConditionTemplate::new(701, Fog, "mist", "50");
const HAZE: ConditionTemplate = ConditionTemplate::new(721, Fog, "haze", "50");
const SMOKE: ConditionTemplate = ConditionTemplate::new(711, Fog, "smoke", "50");
const DUST: ConditionTemplate = ConditionTemplate::new(761, Fog, "dust", "50");
const FEW_CLOUDS: ConditionTemplate = ConditionTemplate::new(801, Clouds, "few clouds", "02");
const SCATTERED_CLOUDS: ConditionTemplate =
    ConditionTemplate::new(802, Clouds, "scattered clouds", "03");
const BROKEN_CLOUDS: ConditionTemplate = ConditionTemplate::new(803, Clouds, "broken clouds", "04");
const OVERCAST: ConditionTemplate = ConditionTemplate::new(804, Clouds, "overcast clouds", "04");
const CLEAR: ConditionTemplate = ConditionTemplate::new(800, Clear, "clear sky", "01");
const WINDY: ConditionTemplate = ConditionTemplate::new(771, Wind, "windy", "50");

/// A text rule matches when any of its phrases occurs in the text. Each word
/// of a phrase matches a word of the text that starts with it, so `"storm"`
/// matches "Thunderstorms" only through `"thunder"`, and `"ice"` never
/// matches inside "Chance".
struct TextRule {
    phrases: &'static [&'static str],
    template: ConditionTemplate,
}

const TEXT_RULES: &[TextRule] = &[
    TextRule { phrases: &["thunder", "storm", "tstm"], template: THUNDERSTORM },
    TextRule { phrases: &["sleet", "freezing", "ice", "icy", "wintry mix"], template: SLEET },
    TextRule { phrases: &["snow", "blizzard", "flurries"], template: SNOW },
    TextRule { phrases: &["drizzle"], template: DRIZZLE },
    TextRule { phrases: &["shower"], template: SHOWERS },
    TextRule { phrases: &["rain"], template: RAIN },
    TextRule { phrases: &["fog"], template: FOG },
    TextRule { phrases: &["mist"], template: MIST },
    TextRule { phrases: &["haze", "hazy"], template: HAZE },
    TextRule { phrases: &["smoke", "smoky"], template: SMOKE },
    TextRule { phrases: &["dust", "blowing sand"], template: DUST },
    TextRule { phrases: &["partly cloudy"], template: SCATTERED_CLOUDS },
    TextRule { phrases: &["mostly cloudy", "partly sunny"], template: BROKEN_CLOUDS },
    TextRule { phrases: &["overcast", "cloudy"], template: OVERCAST },
    TextRule { phrases: &["mostly sunny", "mostly clear"], template: FEW_CLOUDS },
    TextRule { phrases: &["sunny", "clear", "fair"], template: CLEAR },
    TextRule { phrases: &["windy", "breezy", "blustery"], template: WINDY },
];

fn words(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn contains_phrase(words: &[String], phrase: &str) -> bool {
    let parts: Vec<&str> = phrase.split(' ').collect();
    words
        .windows(parts.len())
        .any(|window| window.iter().zip(&parts).all(|(w, p)| w.starts_with(p)))
}

/// Template for a free-text phrase such as "Chance Light Snow".
pub fn text_template(text: &str) -> ConditionTemplate {
    let words = words(text);
    TEXT_RULES
        .iter()
        .find(|rule| rule.phrases.iter().any(|p| contains_phrase(&words, p)))
        .map(|rule| rule.template)
        .unwrap_or(CLEAR)
}

pub fn classify_text(text: &str, is_daytime: bool) -> Condition {
    text_template(text).build(is_daytime)
}

/// Structured phenomenon codes, in priority order.
const CODE_RULES: &[(&[&str], ConditionTemplate)] = &[
    (&["thunderstorms"], THUNDERSTORM),
    (
        &["sleet", "freezing_rain", "freezing_drizzle", "freezing_spray", "ice_pellets", "hail"],
        SLEET,
    ),
    (&["snow", "snow_showers", "blowing_snow", "ice_crystals"], SNOW),
    (&["drizzle"], DRIZZLE),
    (&["rain_showers"], SHOWERS),
    (&["rain"], RAIN),
    (&["fog", "freezing_fog", "ice_fog"], FOG),
    (&["haze"], HAZE),
    (&["smoke"], SMOKE),
    (&["dust", "blowing_dust", "blowing_sand", "volcanic_ash"], DUST),
];

fn code_template(code: &WeatherCode) -> Option<ConditionTemplate> {
    let weather = code.weather.as_deref()?;
    CODE_RULES
        .iter()
        .find(|(codes, _)| codes.contains(&weather))
        .map(|(_, template)| *template)
}

/// Adjusts the template id for intensity, e.g. heavy rain is 502.
fn with_intensity(template: ConditionTemplate, intensity: Option<&str>) -> ConditionTemplate {
    let delta: i16 = match (template.category, intensity) {
        (Rain | Snow, Some("light" | "very_light")) => -1,
        (Rain | Snow | Thunderstorm, Some("heavy")) => 1,
        _ => 0,
    };
    ConditionTemplate { id: template.id.saturating_add_signed(delta), ..template }
}

/// Classifies one structured code. A code with no phenomenon is clear sky.
pub fn classify_code(code: &WeatherCode, is_daytime: bool) -> Condition {
    let Some(template) = code_template(code) else {
        return CLEAR.build(is_daytime);
    };
    let template = with_intensity(template, code.intensity.as_deref());

    let mut description = String::new();
    if let Some(coverage) = code.coverage.as_deref() {
        description.push_str(&coverage.replace('_', " "));
        description.push(' ');
    }
    if let Some(intensity) = code.intensity.as_deref().filter(|i| *i != "moderate") {
        description.push_str(&intensity.replace('_', " "));
        description.push(' ');
    }
    description.push_str(template.description);

    template.condition(description, is_daytime)
}

/// Classifies the most severe of several simultaneous codes.
pub fn classify_codes(codes: &[WeatherCode], is_daytime: bool) -> Option<Condition> {
    codes
        .iter()
        .filter(|c| code_template(c).is_some())
        .min_by_key(|c| code_template(c).map(|t| t.category.rank()))
        .map(|c| classify_code(c, is_daytime))
}

/// Cloud cover percentage to a cloud condition.
pub fn classify_sky_cover(percent: f64, is_daytime: bool) -> Condition {
    let template = match percent {
        p if p <= 12.0 => CLEAR,
        p if p <= 37.0 => FEW_CLOUDS,
        p if p <= 62.0 => SCATTERED_CLOUDS,
        p if p <= 87.0 => BROKEN_CLOUDS,
        _ => OVERCAST,
    };
    template.build(is_daytime)
}

/// Whether `instant` is daytime. A forecast period's own flag wins, then
/// sunrise/sunset shifted to the instant's local date, then 06:00-18:00 local.
pub fn resolve_daytime(
    instant: DateTime<Utc>,
    period_is_daytime: Option<bool>,
    sun: Option<&SunTimes>,
    tz: Tz,
) -> bool {
    if let Some(flag) = period_is_daytime {
        return flag;
    }

    let local = instant.with_timezone(&tz);
    if let Some(sun) = sun {
        let base_date = sun.sunrise.with_timezone(&tz).date_naive();
        let offset = (local.date_naive() - base_date).num_days();
        let sun = sun.shifted_days(offset);
        return sun.sunrise <= instant && instant < sun.sunset;
    }

    (6..18).contains(&local.hour())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use chrono_tz::America::New_York;

    fn code(coverage: Option<&str>, weather: Option<&str>, intensity: Option<&str>) -> WeatherCode {
        WeatherCode {
            coverage: coverage.map(String::from),
            weather: weather.map(String::from),
            intensity: intensity.map(String::from),
        }
    }

    #[test]
    fn chance_light_snow_is_snow() {
        let c = classify_text("Chance Light Snow", true);
        assert_eq!(c.category, Snow);
        assert!(c.icon.ends_with('d'));
        assert_eq!(c.icon, "13d");
    }

    #[test]
    fn priority_order_is_first_match() {
        assert_eq!(classify_text("Rain And Snow Likely", true).category, Snow);
        assert_eq!(classify_text("Showers And Thunderstorms", true).category, Thunderstorm);
        assert_eq!(classify_text("Freezing Rain", true).category, Sleet);
        assert_eq!(classify_text("Patchy Fog then Mostly Sunny", true).category, Fog);
        assert_eq!(classify_text("Slight Chance Rain Showers", false).id, 521);
    }

    #[test]
    fn cloud_sub_cases() {
        assert_eq!(classify_text("Partly Cloudy", true).id, 802);
        assert_eq!(classify_text("Mostly Cloudy", true).id, 803);
        assert_eq!(classify_text("Partly Sunny", true).id, 803);
        assert_eq!(classify_text("Cloudy", true).id, 804);
        assert_eq!(classify_text("Mostly Sunny", true).id, 801);
        assert_eq!(classify_text("Mostly Clear", false).icon, "02n");
        assert_eq!(classify_text("Sunny", true).id, 800);
    }

    #[test]
    fn wind_and_default() {
        let c = classify_text("Breezy", true);
        assert_eq!(c.category, Wind);
        let c = classify_text("", false);
        assert_eq!(c.category, Clear);
        assert_eq!(c.icon, "01n");
        assert_eq!(classify_text("Sunny and Breezy", true).category, Clear);
    }

    #[test]
    fn ice_matches_whole_words_only() {
        assert_eq!(classify_text("Chance Rain", true).category, Rain);
        assert_eq!(classify_text("Patchy Ice", true).category, Sleet);
        assert_eq!(classify_text("Icy Roads", true).category, Sleet);
    }

    #[test]
    fn structured_code_with_intensity() {
        let c = classify_code(&code(Some("chance"), Some("rain_showers"), Some("light")), true);
        assert_eq!(c.category, Rain);
        assert_eq!(c.id, 520);
        assert_eq!(c.description, "chance light shower rain");
        assert_eq!(c.icon, "09d");

        let c = classify_code(&code(Some("likely"), Some("rain"), Some("heavy")), false);
        assert_eq!(c.id, 502);
        assert_eq!(c.icon, "10n");

        let c = classify_code(&code(None, Some("snow"), Some("moderate")), true);
        assert_eq!(c.description, "snow");
    }

    #[test]
    fn structured_code_without_weather_is_clear() {
        assert_eq!(classify_code(&code(None, None, None), true).category, Clear);
        assert_eq!(classify_code(&code(None, Some("frost"), None), true).category, Clear);
    }

    #[test]
    fn most_severe_code_wins() {
        let codes = [
            code(Some("chance"), Some("rain"), None),
            code(Some("slight_chance"), Some("thunderstorms"), None),
        ];
        let c = classify_codes(&codes, true).unwrap();
        assert_eq!(c.category, Thunderstorm);
        assert!(classify_codes(&[], true).is_none());
    }

    #[test]
    fn sky_cover_thresholds() {
        assert_eq!(classify_sky_cover(5.0, true).id, 800);
        assert_eq!(classify_sky_cover(30.0, true).id, 801);
        assert_eq!(classify_sky_cover(50.0, true).id, 802);
        assert_eq!(classify_sky_cover(80.0, true).id, 803);
        assert_eq!(classify_sky_cover(100.0, true).id, 804);
    }

    #[test]
    fn daytime_prefers_period_flag() {
        let midnight = Utc.with_ymd_and_hms(2025, 12, 20, 5, 0, 0).unwrap();
        assert!(resolve_daytime(midnight, Some(true), None, New_York));
    }

    #[test]
    fn daytime_from_sun_times_shifted() {
        let sun = SunTimes {
            sunrise: Utc.with_ymd_and_hms(2025, 12, 20, 12, 15, 0).unwrap(),
            sunset: Utc.with_ymd_and_hms(2025, 12, 20, 21, 40, 0).unwrap(),
        };
        let next_noon = Utc.with_ymd_and_hms(2025, 12, 21, 17, 0, 0).unwrap();
        let next_evening = Utc.with_ymd_and_hms(2025, 12, 21, 23, 0, 0).unwrap();
        assert!(resolve_daytime(next_noon, None, Some(&sun), New_York));
        assert!(!resolve_daytime(next_evening, None, Some(&sun), New_York));
    }

    #[test]
    fn daytime_fixed_hours_fallback() {
        let morning = Utc.with_ymd_and_hms(2025, 12, 20, 11, 30, 0).unwrap();
        let night = Utc.with_ymd_and_hms(2025, 12, 20, 23, 30, 0).unwrap();
        assert!(resolve_daytime(morning, None, None, New_York));
        assert!(!resolve_daytime(night, None, None, New_York));
    }
}
