/// Renders a byte count rounded to B, KiB, MiB or GiB as appropriate
pub fn format_bytes(num_bytes: u64) -> String {
    const KIBI: u64 = 1024;

    if num_bytes < KIBI {
        format!("{} B", num_bytes)
    }
    else if num_bytes < KIBI << 10 {
        format!("{:.2} KiB", num_bytes as f64 / KIBI as f64)
    }
    else if num_bytes < KIBI << 20 {
        format!("{:.2} MiB", num_bytes as f64 / (KIBI << 10) as f64)
    }
    else {
        format!("{:.2} GiB", num_bytes as f64 / (KIBI << 20) as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0, "0 B")]
    #[case(1023, "1023 B")]
    #[case(1024, "1.00 KiB")]
    #[case(1536, "1.50 KiB")]
    #[case(3 * 1024 * 1024, "3.00 MiB")]
    #[case(5 * 1024 * 1024 * 1024, "5.00 GiB")]
    #[case(4096 * 1024 * 1024 * 1024, "4096.00 GiB")]
    fn test_format_bytes(#[case] num_bytes: u64, #[case] expected: &str) {
        assert_eq!(format_bytes(num_bytes), expected);
    }
}
