pub mod duration;
pub mod ip;

/// 生成 128 位随机十六进制字符串
pub fn generate_hex_id() -> String {
    format!("{:032x}", rand::random::<u128>())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_hex_id() {
        let a = generate_hex_id();
        let b = generate_hex_id();
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }
}
