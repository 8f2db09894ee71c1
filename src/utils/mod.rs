pub mod id_encoding;
pub mod locked_cache;

pub use id_encoding::RepositoryBasedId;
pub use locked_cache::LockedCache;

/// Quote an SQLite identifier with brackets.
pub fn quote_ident(name: &str) -> String {
    format!("[{}]", name.replace(']', "]]"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("ts_Base"), "[ts_Base]");
        assert_eq!(quote_ident("a]b"), "[a]]b]");
    }
}
