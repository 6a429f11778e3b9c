use chrono::{Duration, NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

/// Working hours of a business for one weekday.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeSlot {
    pub day: String,
    pub start: String,
    pub end: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Availability {
    #[serde(default = "default_slot_minutes")]
    pub slot_minutes: u32,
    #[serde(default)]
    pub slots: Vec<TimeSlot>,
}

fn default_slot_minutes() -> u32 {
    30
}

// Persian week starts on Saturday
const DAY_ORDER: [&str; 7] = ["sat", "sun", "mon", "tue", "wed", "thu", "fri"];

impl Availability {
    pub fn from_json(s: &str) -> anyhow::Result<Self> {
        let availability: Availability = serde_json::from_str(s)?;
        if !(5..=240).contains(&availability.slot_minutes) {
            anyhow::bail!("slot_minutes out of range: {}", availability.slot_minutes);
        }
        for slot in &availability.slots {
            parse_weekday(&slot.day)?;
            let start = parse_hhmm(&slot.start)?;
            let end = parse_hhmm(&slot.end)?;
            if start >= end {
                anyhow::bail!("slot start must be before end: {}-{}", slot.start, slot.end);
            }
        }
        Ok(availability)
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn is_open(&self, date: NaiveDate, time: NaiveTime) -> bool {
        self.slots_for(date)
            .any(|(start, end)| time >= start && time < end)
    }

    /// Start times of every bookable slot on `date`, ascending.
    pub fn slot_times(&self, date: NaiveDate) -> Vec<NaiveTime> {
        let step = Duration::minutes(self.slot_minutes as i64);
        let mut times = Vec::new();

        for (start, end) in self.slots_for(date) {
            let mut t = start;
            while t < end {
                times.push(t);
                let (next, wrapped) = t.overflowing_add_signed(step);
                if wrapped != 0 {
                    break;
                }
                t = next;
            }
        }

        times.sort();
        times.dedup();
        times
    }

    pub fn to_human_readable(&self) -> String {
        if self.slots.is_empty() {
            return String::new();
        }

        let mut sorted_slots = self.slots.clone();
        sorted_slots.sort_by_key(|s| day_index(&s.day));

        sorted_slots
            .iter()
            .map(|s| format!("{}: {}-{}", capitalize(&s.day), s.start, s.end))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn slots_for(&self, date: NaiveDate) -> impl Iterator<Item = (NaiveTime, NaiveTime)> + '_ {
        let weekday = date.format("%a").to_string().to_lowercase();
        self.slots.iter().filter_map(move |slot| {
            if slot.day.to_lowercase() != weekday {
                return None;
            }
            Some((parse_hhmm(&slot.start).ok()?, parse_hhmm(&slot.end).ok()?))
        })
    }
}

fn day_index(day: &str) -> usize {
    DAY_ORDER
        .iter()
        .position(|d| *d == day.to_lowercase())
        .unwrap_or(DAY_ORDER.len())
}

fn capitalize(s: &str) -> String {
    let mut c = s.chars();
    match c.next() {
        None => String::new(),
        Some(f) => f.to_uppercase().to_string() + &c.as_str().to_lowercase(),
    }
}

fn parse_weekday(s: &str) -> anyhow::Result<()> {
    if day_index(s) < DAY_ORDER.len() {
        Ok(())
    } else {
        Err(anyhow::anyhow!("invalid weekday: {s}"))
    }
}

fn parse_hhmm(s: &str) -> anyhow::Result<NaiveTime> {
    NaiveTime::parse_from_str(s, "%H:%M").map_err(|_| anyhow::anyhow!("invalid time: {s}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn time(s: &str) -> NaiveTime {
        NaiveTime::parse_from_str(s, "%H:%M").unwrap()
    }

    #[test]
    fn test_parse_valid_json() {
        let json = r#"{"slots":[{"day":"sat","start":"09:00","end":"17:00"},{"day":"sun","start":"09:00","end":"17:00"}]}"#;
        let avail = Availability::from_json(json).unwrap();
        assert_eq!(avail.slots.len(), 2);
        assert_eq!(avail.slot_minutes, 30);
    }

    #[test]
    fn test_parse_invalid() {
        assert!(Availability::from_json("not json").is_err());
        assert!(Availability::from_json(r#"{"slots":[{"day":"xyz","start":"09:00","end":"17:00"}]}"#).is_err());
        assert!(Availability::from_json(r#"{"slots":[{"day":"sat","start":"25:00","end":"17:00"}]}"#).is_err());
        assert!(Availability::from_json(r#"{"slots":[{"day":"sat","start":"17:00","end":"09:00"}]}"#).is_err());
        assert!(Availability::from_json(r#"{"slot_minutes":0,"slots":[]}"#).is_err());
    }

    #[test]
    fn test_is_open() {
        let avail = Availability::from_json(
            r#"{"slots":[{"day":"sat","start":"09:00","end":"17:00"}]}"#,
        )
        .unwrap();
        // 2026-10-17 is a Saturday
        assert!(avail.is_open(date("2026-10-17"), time("09:00")));
        assert!(avail.is_open(date("2026-10-17"), time("16:59")));
        assert!(!avail.is_open(date("2026-10-17"), time("17:00")));
        assert!(!avail.is_open(date("2026-10-17"), time("08:30")));
        // Sunday
        assert!(!avail.is_open(date("2026-10-18"), time("10:00")));
    }

    #[test]
    fn test_slot_times() {
        let avail = Availability::from_json(
            r#"{"slot_minutes":60,"slots":[{"day":"sat","start":"09:00","end":"12:00"},{"day":"sat","start":"16:00","end":"18:00"}]}"#,
        )
        .unwrap();
        let times = avail.slot_times(date("2026-10-17"));
        let formatted: Vec<String> = times.iter().map(|t| t.format("%H:%M").to_string()).collect();
        assert_eq!(formatted, vec!["09:00", "10:00", "11:00", "16:00", "17:00"]);
        assert!(avail.slot_times(date("2026-10-18")).is_empty());
    }

    #[test]
    fn test_slot_times_near_midnight_does_not_wrap() {
        let avail = Availability::from_json(
            r#"{"slot_minutes":45,"slots":[{"day":"sat","start":"22:30","end":"23:59"}]}"#,
        )
        .unwrap();
        let times = avail.slot_times(date("2026-10-17"));
        assert_eq!(times, vec![time("22:30"), time("23:15")]);
    }

    #[test]
    fn test_to_human_readable_saturday_first() {
        let avail = Availability::from_json(
            r#"{"slots":[{"day":"mon","start":"10:00","end":"16:00"},{"day":"sat","start":"09:00","end":"17:00"}]}"#,
        )
        .unwrap();
        assert_eq!(avail.to_human_readable(), "Sat: 09:00-17:00, Mon: 10:00-16:00");
    }

    #[test]
    fn test_to_human_readable_empty() {
        let avail = Availability::from_json(r#"{"slots":[]}"#).unwrap();
        assert!(avail.is_empty());
        assert_eq!(avail.to_human_readable(), "");
    }
}
