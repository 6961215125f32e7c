use time::{macros::format_description, Date};

/// Cents to US dollars, e.g. `123456` -> `$1,234.56`.
pub fn format_currency(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let cents = cents.unsigned_abs();
    let dollars = (cents / 100).to_string();
    let mut grouped = String::with_capacity(dollars.len() + dollars.len() / 3);
    for (i, ch) in dollars.chars().enumerate() {
        if i > 0 && (dollars.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    format!("{sign}${grouped}.{:02}", cents % 100)
}

/// `2022-12-06` -> `Dec 6, 2022`.
pub fn format_date_to_local(date: Date) -> String {
    let fmt = format_description!("[month repr:short] [day padding:none], [year]");
    date.format(&fmt).unwrap_or_else(|_| date.to_string())
}
