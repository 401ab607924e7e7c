use thiserror::Error;

/// Canonical CIQ error taxonomy used across crates.
///
/// Classification guidance:
/// - [`CiqError::InvariantViolation`]: a structural contract of the plan was broken
/// - [`CiqError::IncompatibleTypes`]: an expression combines operands the type matrix rejects
/// - [`CiqError::UnknownColumn`]: a column reference that cannot be resolved
/// - [`CiqError::InvalidConfig`]: calibration/configuration contract violations
/// - [`CiqError::Unsupported`]: valid shape that is intentionally unimplemented
#[derive(Debug, Error)]
pub enum CiqError {
    /// A structural contract of the logical plan was broken.
    ///
    /// Examples:
    /// - cross join constructed with predicates, or a non-cross join without any
    /// - a derived property was requested while a required input is unset
    /// - positional union over inputs with mismatched column counts
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// An expression was constructed over operands the compatibility matrix rejects.
    ///
    /// Examples:
    /// - comparing a string column against a numeric literal
    /// - `LIKE` over non-string operands
    #[error("incompatible types: {0}")]
    IncompatibleTypes(String),

    /// A column reference that names no resolvable column.
    ///
    /// Examples:
    /// - the referenced node was released while the expression was still held
    /// - a column id past the end of a stored table's column list
    #[error("unknown column: {0}")]
    UnknownColumn(String),

    /// Invalid or inconsistent configuration/catalog state.
    ///
    /// Examples:
    /// - a table name the catalog does not know
    /// - calibration selectivity outside `[0, 1]`
    /// - empty data-type or encoding enumerations
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Valid request for a shape not implemented in the current version.
    #[error("unsupported: {0}")]
    Unsupported(String),
}

/// Standard CIQ result alias.
pub type Result<T> = std::result::Result<T, CiqError>;

#[cfg(test)]
mod tests {
    use super::CiqError;

    #[test]
    fn error_display_carries_classification_prefix() {
        let err = CiqError::InvariantViolation("cross joins take no predicate".to_string());
        assert_eq!(
            err.to_string(),
            "invariant violation: cross joins take no predicate"
        );

        let err = CiqError::IncompatibleTypes("String vs Int".to_string());
        assert!(err.to_string().starts_with("incompatible types:"));
    }
}
