//! Unit tests for repository-based instance ids

#[cfg(test)]
mod id_encoding_tests {
    use ecdb::utils::RepositoryBasedId;
    use test_case::test_case;

    #[test_case(0, 1 ; "first id of repository zero")]
    #[test_case(5, 1 ; "first id of repository five")]
    #[test_case(5, u32::MAX ; "last id of repository five")]
    #[test_case(i32::MAX as u32, 7 ; "largest repository")]
    fn test_round_trip(repository_id: u32, local_id: u32) {
        let id = RepositoryBasedId::new(repository_id, local_id);
        assert_eq!(id.repository_id(), repository_id);
        assert_eq!(id.local_id(), local_id);
        assert!(id.is_valid());
        assert_eq!(RepositoryBasedId::from_value(id.value()), id);
    }

    #[test]
    fn test_repository_ranges_do_not_overlap() {
        let last_of_four = RepositoryBasedId::new(4, u32::MAX).value();
        let first_of_five = RepositoryBasedId::new(5, 1).value();
        assert!(last_of_four < first_of_five);
        assert_eq!(first_of_five, (5i64 << 32) + 1);
    }

    #[test]
    fn test_invalid_ids() {
        assert!(!RepositoryBasedId::from_value(0).is_valid());
        assert!(!RepositoryBasedId::from_value(-1).is_valid());
        assert!(!RepositoryBasedId::range_start(5).is_valid());
    }

    #[test]
    fn test_display() {
        assert_eq!(RepositoryBasedId::new(5, 42).to_string(), "5:42");
    }
}
