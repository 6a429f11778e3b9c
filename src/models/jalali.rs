use chrono::{Datelike, NaiveDate, NaiveTime, Timelike};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JalaliDate {
    pub year: i32,
    pub month: u32,
    pub day: u32,
}

const MONTH_NAMES: [&str; 12] = [
    "فروردین",
    "اردیبهشت",
    "خرداد",
    "تیر",
    "مرداد",
    "شهریور",
    "مهر",
    "آبان",
    "آذر",
    "دی",
    "بهمن",
    "اسفند",
];

const DAYS_BEFORE_MONTH: [i32; 12] = [0, 31, 59, 90, 120, 151, 181, 212, 243, 273, 304, 334];

impl JalaliDate {
    pub fn from_gregorian(date: NaiveDate) -> Self {
        let gy = date.year();
        let gm = date.month() as usize;
        let gd = date.day() as i32;

        let gy2 = if gm > 2 { gy + 1 } else { gy };
        let mut days = 355_666 + 365 * gy + (gy2 + 3) / 4 - (gy2 + 99) / 100 + (gy2 + 399) / 400
            + gd
            + DAYS_BEFORE_MONTH[gm - 1];

        let mut year = -1595 + 33 * (days / 12_053);
        days %= 12_053;
        year += 4 * (days / 1461);
        days %= 1461;
        if days > 365 {
            year += (days - 1) / 365;
            days = (days - 1) % 365;
        }

        let (month, day) = if days < 186 {
            (1 + days / 31, 1 + days % 31)
        } else {
            (7 + (days - 186) / 30, 1 + (days - 186) % 30)
        };

        Self {
            year,
            month: month as u32,
            day: day as u32,
        }
    }

    pub fn month_name(&self) -> &'static str {
        MONTH_NAMES[(self.month as usize).saturating_sub(1) % 12]
    }

    /// `1405/07/26` in ASCII digits.
    pub fn to_numeric(&self) -> String {
        format!("{:04}/{:02}/{:02}", self.year, self.month, self.day)
    }

    /// `۲۶ مهر ۱۴۰۵`, the form used in customer-facing SMS.
    pub fn to_persian_long(&self) -> String {
        format!(
            "{} {} {}",
            to_persian_digits(&self.day.to_string()),
            self.month_name(),
            to_persian_digits(&self.year.to_string())
        )
    }
}

pub fn to_persian_digits(s: &str) -> String {
    s.chars()
        .map(|c| match c.to_digit(10) {
            Some(d) => char::from_u32('۰' as u32 + d).unwrap_or(c),
            None => c,
        })
        .collect()
}

pub fn persian_time(time: NaiveTime) -> String {
    to_persian_digits(&format!("{:02}:{:02}", time.hour(), time.minute()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jalali(y: i32, m: u32, d: u32) -> JalaliDate {
        JalaliDate::from_gregorian(NaiveDate::from_ymd_opt(y, m, d).unwrap())
    }

    #[test]
    fn test_nowruz() {
        assert_eq!(jalali(2024, 3, 20), JalaliDate { year: 1403, month: 1, day: 1 });
        assert_eq!(jalali(2025, 3, 21), JalaliDate { year: 1404, month: 1, day: 1 });
        assert_eq!(jalali(2023, 3, 21), JalaliDate { year: 1402, month: 1, day: 1 });
    }

    #[test]
    fn test_leap_year_end() {
        // 1403 is a leap year, so Esfand has 30 days
        assert_eq!(jalali(2025, 3, 20), JalaliDate { year: 1403, month: 12, day: 30 });
    }

    #[test]
    fn test_second_half_of_year() {
        assert_eq!(jalali(2026, 10, 18), JalaliDate { year: 1405, month: 7, day: 26 });
        assert_eq!(jalali(2024, 12, 31), JalaliDate { year: 1403, month: 10, day: 11 });
        assert_eq!(jalali(2025, 9, 22), JalaliDate { year: 1404, month: 6, day: 31 });
    }

    #[test]
    fn test_formatting() {
        let date = jalali(2026, 10, 18);
        assert_eq!(date.to_numeric(), "1405/07/26");
        assert_eq!(date.month_name(), "مهر");
        assert_eq!(date.to_persian_long(), "۲۶ مهر ۱۴۰۵");
    }

    #[test]
    fn test_persian_digits() {
        assert_eq!(to_persian_digits("09:30"), "۰۹:۳۰");
        assert_eq!(to_persian_digits("abc"), "abc");
        let time = NaiveTime::from_hms_opt(14, 5, 0).unwrap();
        assert_eq!(persian_time(time), "۱۴:۰۵");
    }
}
