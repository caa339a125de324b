/// Format an age in days the way a human reads it: minutes/hours for
/// same-day entries, days up to a month, months beyond that.
pub fn format_age(days: f64) -> String {
    if days < 1.0 {
        let hours = days * 24.0;
        if hours < 1.0 {
            return format!("{} minutes ago", (hours * 60.0) as i64);
        }
        return format!("{} hours ago", hours as i64);
    }
    if days < 30.0 {
        return format!("{} days ago", days as i64);
    }
    format!("{} months ago", (days / 30.0) as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_each_bucket() {
        assert_eq!(format_age(0.0), "0 minutes ago");
        assert_eq!(format_age(2.0 / 24.0), "2 hours ago");
        assert_eq!(format_age(5.0), "5 days ago");
        assert_eq!(format_age(90.0), "3 months ago");
    }
}
