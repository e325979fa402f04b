use crate::{DbError, DbResult, DriverInfo};

/// Pool sizing; unset fields fall back to driver defaults.
#[derive(Clone, Copy, Debug, Default)]
pub struct PoolConfig {
    /// Upper bound on connections handed out plus idle ones.
    pub max_size: Option<usize>,
    /// Upper bound on idle connections kept for reuse.
    pub max_idle_size: Option<usize>,
    /// A connection is closed, not idled, after this many acquisitions.
    pub max_use_count: Option<u64>,
}

/// Default bound on how often one connection is handed out.
pub const DEFAULT_MAX_USE_COUNT: u64 = 100;

// Resolves the requested sizes against the argument rules and the driver's
// concurrency/poolability capabilities.
pub(crate) fn effective_pool_sizes(
    info: &DriverInfo,
    config: &PoolConfig,
) -> DbResult<(usize, usize)> {
    let (size, idle) = match (config.max_size, config.max_idle_size) {
        (None, None) => (info.default_max_size, info.default_max_idle_size),
        (Some(size), None) => (size, size.min(info.default_max_idle_size)),
        (None, Some(_)) => {
            return Err(DbError::Usage(
                "pool max_idle_size requires max_size to be set",
            ))
        }
        (Some(size), Some(idle)) => {
            if idle > size {
                return Err(DbError::Usage(
                    "pool max_idle_size must not exceed max_size",
                ));
            }
            (size, idle)
        }
    };

    Ok(match (info.can_concur, info.can_pool) {
        (true, true) => (size, idle),
        // connections cannot be reused: always connect fresh
        (true, false) => (size, 0),
        (false, true) => {
            if idle == 0 {
                (1, 0)
            } else {
                (1, 1)
            }
        }
        (false, false) => (1, 0),
    })
}

#[cfg(test)]
mod tests {
    use super::{effective_pool_sizes, PoolConfig};
    use crate::DriverInfo;

    fn info(can_concur: bool, can_pool: bool) -> DriverInfo {
        DriverInfo {
            name: "testdb",
            can_concur,
            can_pool,
            default_max_size: 8,
            default_max_idle_size: 8,
        }
    }

    fn config(max_size: Option<usize>, max_idle_size: Option<usize>) -> PoolConfig {
        PoolConfig {
            max_size,
            max_idle_size,
            max_use_count: None,
        }
    }

    #[test]
    fn unset_sizes_use_driver_defaults() {
        let sizes = effective_pool_sizes(&info(true, true), &config(None, None)).unwrap();
        assert_eq!(sizes, (8, 8));
    }

    #[test]
    fn idle_without_size_is_invalid() {
        assert!(effective_pool_sizes(&info(true, true), &config(None, Some(1))).is_err());
        assert!(effective_pool_sizes(&info(true, true), &config(Some(2), Some(3))).is_err());
    }

    #[test]
    fn capability_gating_table() {
        let cfg = config(Some(5), Some(3));
        assert_eq!(
            effective_pool_sizes(&info(true, true), &cfg).unwrap(),
            (5, 3)
        );
        assert_eq!(
            effective_pool_sizes(&info(true, false), &cfg).unwrap(),
            (5, 0)
        );
        assert_eq!(
            effective_pool_sizes(&info(false, true), &cfg).unwrap(),
            (1, 1)
        );
        assert_eq!(
            effective_pool_sizes(&info(false, true), &config(Some(5), Some(0))).unwrap(),
            (1, 0)
        );
        assert_eq!(
            effective_pool_sizes(&info(false, false), &cfg).unwrap(),
            (1, 0)
        );
    }
}
