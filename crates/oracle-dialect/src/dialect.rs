//! Dialect capability flags.
//!
//! One immutable struct constructed once per generator instance, replacing
//! run-time mutation of shared defaults. Flags gate query shapes; they are
//! data, not behavior.

/// Maximum identifier length the database accepts.
pub const MAX_IDENTIFIER_LENGTH: usize = 30;

/// Strings at or above this length cannot be inlined as SQL literals and
/// must be promoted to out-of-line CLOB binds.
pub const INLINE_STRING_CAP: usize = 4000;

/// Capability flags for the Oracle dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DialectSupports {
    /// `DEFAULT` keyword usable in VALUES lists.
    pub default_keyword: bool,
    /// `INSERT INTO t DEFAULT VALUES` form.
    pub default_values: bool,
    /// `RETURNING ... INTO :bind` clause.
    pub returning_into: bool,
    /// Identity-insert enable/disable bracketing around explicit
    /// autoincrement values.
    pub identity_insert: bool,
    /// Autoincrement columns accept `DEFAULT` in place of a value.
    pub autoincrement_default_value: bool,
    /// Schema-qualified table names.
    pub schemas: bool,
    /// Row locking clauses.
    pub lock: bool,
    /// Association-table joins must be wrapped so the through-join is
    /// atomically dependent on the target join.
    pub join_table_dependent: bool,
    /// `NULLS FIRST/LAST` on ORDER BY handled natively by the engine.
    pub order_nulls: bool,
}

impl DialectSupports {
    pub const fn oracle() -> Self {
        DialectSupports {
            default_keyword: true,
            default_values: true,
            returning_into: true,
            identity_insert: true,
            autoincrement_default_value: false,
            schemas: true,
            lock: false,
            join_table_dependent: true,
            order_nulls: false,
        }
    }
}

impl Default for DialectSupports {
    fn default() -> Self {
        Self::oracle()
    }
}
