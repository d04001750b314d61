//! Renders timestamps with the `yyyyMMdd`-style patterns stored in templates.
//!
//! Supported tokens: `y`, `yy`, `yyyy`, `M`, `MM`, `MMM`, `MMMM`, `d`, `dd`,
//! `ddd`, `dddd`, `H`, `HH`, `h`, `hh`, `m`, `mm`, `s`, `ss`, `f`..`fffffff`,
//! `tt`. Text inside single quotes and unknown characters are copied as-is;
//! a backslash escapes the next character.

use chrono::{DateTime, Datelike, Timelike, Utc};

const MONTHS: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

enum Token {
    Literal(String),
    /// A run of one pattern letter.
    Field(char, usize),
}

fn tokenize(pattern: &str) -> Vec<Token> {
    let chars: Vec<char> = pattern.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if c == '\'' {
            i += 1;
            let mut literal = String::new();
            while i < chars.len() && chars[i] != '\'' {
                literal.push(chars[i]);
                i += 1;
            }
            tokens.push(Token::Literal(literal));
            i += 1;
            continue;
        }
        if c == '\\' {
            if let Some(next) = chars.get(i + 1) {
                tokens.push(Token::Literal(next.to_string()));
            }
            i += 2;
            continue;
        }

        let mut run = 1;
        while i + run < chars.len() && chars[i + run] == c {
            run += 1;
        }
        if matches!(c, 'y' | 'M' | 'd' | 'H' | 'h' | 'm' | 's' | 'f' | 't') {
            tokens.push(Token::Field(c, run));
        } else {
            tokens.push(Token::Literal(std::iter::repeat(c).take(run).collect()));
        }
        i += run;
    }

    tokens
}

pub fn render(pattern: &str, now: &DateTime<Utc>) -> String {
    let mut out = String::with_capacity(pattern.len() + 8);

    for token in tokenize(pattern) {
        let (c, run) = match token {
            Token::Literal(text) => {
                out.push_str(&text);
                continue;
            }
            Token::Field(c, run) => (c, run),
        };
        match c {
            'y' => match run {
                1 => out.push_str(&(now.year() % 100).to_string()),
                2 => out.push_str(&format!("{:02}", now.year() % 100)),
                n => out.push_str(&format!("{:0width$}", now.year(), width = n)),
            },
            'M' => match run {
                1 => out.push_str(&now.month().to_string()),
                2 => out.push_str(&format!("{:02}", now.month())),
                3 => out.push_str(&MONTHS[now.month0() as usize][..3]),
                _ => out.push_str(MONTHS[now.month0() as usize]),
            },
            'd' => match run {
                1 => out.push_str(&now.day().to_string()),
                2 => out.push_str(&format!("{:02}", now.day())),
                3 => out.push_str(&now.weekday().to_string()),
                _ => out.push_str(weekday_name(now)),
            },
            'H' => out.push_str(&two_or_one(now.hour(), run)),
            'h' => {
                let hour12 = match now.hour() % 12 {
                    0 => 12,
                    h => h,
                };
                out.push_str(&two_or_one(hour12, run));
            }
            'm' => out.push_str(&two_or_one(now.minute(), run)),
            's' => out.push_str(&two_or_one(now.second(), run)),
            'f' => {
                let digits = run.min(7);
                let nanos = format!("{:09}", now.nanosecond() % 1_000_000_000);
                out.push_str(&nanos[..digits]);
            }
            _ => {
                let marker = if now.hour() < 12 { "AM" } else { "PM" };
                out.push_str(if run == 1 { &marker[..1] } else { marker });
            }
        }
    }

    out
}

/// Regex fragment matching any text `render` can produce for `pattern`.
/// Four-digit years are assumed.
pub fn regex_fragment(pattern: &str) -> String {
    let mut out = String::new();

    for token in tokenize(pattern) {
        let (c, run) = match token {
            Token::Literal(text) => {
                out.push_str(&regex::escape(&text));
                continue;
            }
            Token::Field(c, run) => (c, run),
        };
        let fragment = match (c, run) {
            ('y', 1) => "[0-9]{1,2}".to_string(),
            ('y', 2) => "[0-9]{2}".to_string(),
            ('y', n) => format!("[0-9]{{{}}}", n.max(4)),
            ('M' | 'd', 3) => "[A-Za-z]{3}".to_string(),
            ('M' | 'd', n) if n >= 4 => "[A-Za-z]+".to_string(),
            ('f', n) => format!("[0-9]{{{}}}", n.min(7)),
            ('t', 1) => "[AP]".to_string(),
            ('t', _) => "[AP]M".to_string(),
            (_, 1) => "[0-9]{1,2}".to_string(),
            _ => "[0-9]{2}".to_string(),
        };
        out.push_str(&fragment);
    }

    out
}

fn two_or_one(value: u32, run: usize) -> String {
    if run >= 2 {
        format!("{:02}", value)
    } else {
        value.to_string()
    }
}

fn weekday_name(now: &DateTime<Utc>) -> &'static str {
    match now.weekday() {
        chrono::Weekday::Mon => "Monday",
        chrono::Weekday::Tue => "Tuesday",
        chrono::Weekday::Wed => "Wednesday",
        chrono::Weekday::Thu => "Thursday",
        chrono::Weekday::Fri => "Friday",
        chrono::Weekday::Sat => "Saturday",
        chrono::Weekday::Sun => "Sunday",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap()
    }

    #[test]
    fn year_month_day_tokens() {
        assert_eq!(render("yyyy", &at()), "2024");
        assert_eq!(render("yyyyMM", &at()), "202403");
        assert_eq!(render("yyyyMMdd", &at()), "20240309");
        assert_eq!(render("yy-M-d", &at()), "24-3-9");
    }

    #[test]
    fn time_tokens() {
        assert_eq!(render("HH:mm:ss", &at()), "14:05:07");
        assert_eq!(render("h tt", &at()), "2 PM");
    }

    #[test]
    fn names_and_literals() {
        assert_eq!(render("MMM", &at()), "Mar");
        assert_eq!(render("MMMM dddd", &at()), "March Saturday");
        assert_eq!(render("'Q'yyyy", &at()), "Q2024");
        assert_eq!(render("\\y yyyy", &at()), "y 2024");
        assert_eq!(render("yyyy/MM", &at()), "2024/03");
    }

    #[test]
    fn fragment_matches_rendered_text() {
        for pattern in ["yyyy", "yyyyMMdd", "yy-M-d", "HH:mm:ss", "h tt", "MMMM dddd", "'Q'yyyy", "fff"] {
            let re = regex::Regex::new(&format!("^{}$", regex_fragment(pattern))).unwrap();
            let text = render(pattern, &at());
            assert!(re.is_match(&text), "{} did not match {}", pattern, text);
        }
    }

    #[test]
    fn fragment_bounds_digit_runs() {
        assert_eq!(regex_fragment("yyyy"), "[0-9]{4}");
        assert_eq!(regex_fragment("yyyyMM"), "[0-9]{4}[0-9]{2}");
        assert_eq!(regex_fragment("'v.'yy"), "v\\.[0-9]{2}");
    }
}
