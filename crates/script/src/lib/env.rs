use std::env;
use std::fmt::Debug;
use std::str::FromStr;

use thiserror::Error;

#[derive(Clone, Copy, PartialEq, Eq)]
pub struct EnvVarSpec {
    pub key: &'static str,
    pub sensitive: bool,
}

#[derive(Clone, Copy)]
pub struct EnvVarValue<TVal> {
    pub spec: &'static EnvVarSpec,
    pub value: TVal,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("Env var {key} is not set")]
    Missing { key: &'static str },

    #[error("Failed to parse env var {key}: {value:?}")]
    FailedToParse { key: &'static str, value: String },
}

impl EnvVarSpec {
    fn read_raw(&'static self) -> Option<String> {
        match env::var(self.key) {
            Ok(val) if !val.trim().is_empty() => Some(val),
            Ok(_) => None,
            Err(e) => {
                tracing::debug!("Failed reading env var {}: {e:?}", self.key);
                None
            }
        }
    }

    fn parse<TVal: FromStr>(&'static self, raw: &str) -> Result<TVal, Error> {
        raw.trim().parse().map_err(|_e| Error::FailedToParse {
            key: self.key,
            value: if self.sensitive { "***".to_owned() } else { raw.to_owned() },
        })
    }

    pub fn default<TVal: FromStr>(&'static self, default: TVal) -> Result<EnvVarValue<TVal>, Error> {
        let as_optional = self.optional()?;
        Ok(EnvVarValue {
            spec: as_optional.spec,
            value: as_optional.value.unwrap_or(default),
        })
    }

    /// Same as [`EnvVarSpec::default`], with the default given in its textual form.
    pub fn default_str<TVal: FromStr>(&'static self, default: &str) -> Result<EnvVarValue<TVal>, Error> {
        let raw = self.read_raw().unwrap_or_else(|| default.to_owned());
        Ok(EnvVarValue {
            spec: self,
            value: self.parse(&raw)?,
        })
    }

    pub fn optional<TVal: FromStr>(&'static self) -> Result<EnvVarValue<Option<TVal>>, Error> {
        let value = match self.read_raw() {
            Some(raw) => Some(self.parse(&raw)?),
            None => None,
        };
        Ok(EnvVarValue { spec: self, value })
    }

    pub fn required<TVal: FromStr>(&'static self) -> Result<EnvVarValue<TVal>, Error> {
        let raw = self.read_raw().ok_or(Error::Missing { key: self.key })?;
        Ok(EnvVarValue {
            spec: self,
            value: self.parse(&raw)?,
        })
    }
}

impl<TVal> EnvVarValue<TVal> {
    /// Wraps a value coming from elsewhere (e.g. a CLI flag) that overrides the env var.
    pub fn overridden(spec: &'static EnvVarSpec, value: TVal) -> Self {
        Self { spec, value }
    }
}

impl<TVal: Debug> Debug for EnvVarValue<TVal> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.spec.sensitive {
            f.write_str("***")
        } else {
            f.write_fmt(format_args!("{:?}", self.value))
        }
    }
}

pub const LOG_FORMAT: EnvVarSpec = EnvVarSpec {
    key: "LOG_FORMAT",
    sensitive: false,
};
pub const SERVICE_BIND_TO_ADDR: EnvVarSpec = EnvVarSpec {
    key: "SERVICE_BIND_TO_ADDR",
    sensitive: false,
};
pub const PROMETHEUS_NAMESPACE: EnvVarSpec = EnvVarSpec {
    key: "PROMETHEUS_NAMESPACE",
    sensitive: false,
};

// RPC urls routinely embed API keys
pub const ETH_RPC_URL: EnvVarSpec = EnvVarSpec {
    key: "ETH_RPC_URL",
    sensitive: true,
};
pub const BEACON_API_URL: EnvVarSpec = EnvVarSpec {
    key: "BEACON_API_URL",
    sensitive: false,
};
pub const BEACON_API_KEY: EnvVarSpec = EnvVarSpec {
    key: "BEACON_API_KEY",
    sensitive: true,
};
pub const REWARDS_PROOFS_URL: EnvVarSpec = EnvVarSpec {
    key: "REWARDS_PROOFS_URL",
    sensitive: false,
};
pub const REWARDS_TREE_FILE: EnvVarSpec = EnvVarSpec {
    key: "REWARDS_TREE_FILE",
    sensitive: false,
};
pub const LIDO_API_URL: EnvVarSpec = EnvVarSpec {
    key: "LIDO_API_URL",
    sensitive: false,
};
pub const IPFS_GATEWAY_URL: EnvVarSpec = EnvVarSpec {
    key: "IPFS_GATEWAY_URL",
    sensitive: false,
};

pub const CACHE_TTL_SECONDS: EnvVarSpec = EnvVarSpec {
    key: "CACHE_TTL_SECONDS",
    sensitive: false,
};
pub const REWARDS_TREE_TTL_SECONDS: EnvVarSpec = EnvVarSpec {
    key: "REWARDS_TREE_TTL_SECONDS",
    sensitive: false,
};
pub const CACHE_MAX_ENTRIES: EnvVarSpec = EnvVarSpec {
    key: "CACHE_MAX_ENTRIES",
    sensitive: false,
};

pub const CSMODULE_ADDRESS: EnvVarSpec = EnvVarSpec {
    key: "CSMODULE_ADDRESS",
    sensitive: false,
};
pub const CSACCOUNTING_ADDRESS: EnvVarSpec = EnvVarSpec {
    key: "CSACCOUNTING_ADDRESS",
    sensitive: false,
};
pub const CSFEEDISTRIBUTOR_ADDRESS: EnvVarSpec = EnvVarSpec {
    key: "CSFEEDISTRIBUTOR_ADDRESS",
    sensitive: false,
};
pub const STETH_ADDRESS: EnvVarSpec = EnvVarSpec {
    key: "STETH_ADDRESS",
    sensitive: false,
};

pub const OPERATOR_LOOKUP_CONCURRENCY: EnvVarSpec = EnvVarSpec {
    key: "OPERATOR_LOOKUP_CONCURRENCY",
    sensitive: false,
};
pub const DISTRIBUTION_LOG_FROM_BLOCK: EnvVarSpec = EnvVarSpec {
    key: "DISTRIBUTION_LOG_FROM_BLOCK",
    sensitive: false,
};
pub const DISTRIBUTION_LOG_BLOCK_RANGE: EnvVarSpec = EnvVarSpec {
    key: "DISTRIBUTION_LOG_BLOCK_RANGE",
    sensitive: false,
};

#[cfg(test)]
mod tests {
    use super::*;

    // Each test uses its own key: tests run in parallel within one process
    const TEST_NUMBER: EnvVarSpec = EnvVarSpec {
        key: "CSM_DASHBOARD_TEST_NUMBER",
        sensitive: false,
    };
    const TEST_SECRET: EnvVarSpec = EnvVarSpec {
        key: "CSM_DASHBOARD_TEST_SECRET",
        sensitive: true,
    };
    const TEST_MISSING: EnvVarSpec = EnvVarSpec {
        key: "CSM_DASHBOARD_TEST_MISSING",
        sensitive: false,
    };
    const TEST_EMPTY: EnvVarSpec = EnvVarSpec {
        key: "CSM_DASHBOARD_TEST_EMPTY",
        sensitive: false,
    };

    #[test]
    fn reads_and_parses() {
        env::set_var(TEST_NUMBER.key, " 42 ");
        let value: EnvVarValue<u64> = TEST_NUMBER.default(7).unwrap();
        assert_eq!(value.value, 42);
        assert_eq!(format!("{value:?}"), "42");
        let required: EnvVarValue<u64> = TEST_NUMBER.required().unwrap();
        assert_eq!(required.value, 42);
    }

    #[test]
    fn missing_values() {
        env::remove_var(TEST_MISSING.key);
        assert_eq!(TEST_MISSING.default(7u64).unwrap().value, 7);
        assert_eq!(TEST_MISSING.default_str::<u64>("8").unwrap().value, 8);
        assert_eq!(TEST_MISSING.optional::<u64>().unwrap().value, None);
        assert!(matches!(
            TEST_MISSING.required::<u64>(),
            Err(Error::Missing {
                key: "CSM_DASHBOARD_TEST_MISSING"
            })
        ));
    }

    #[test]
    fn empty_value_is_unset() {
        env::set_var(TEST_EMPTY.key, "");
        assert_eq!(TEST_EMPTY.optional::<String>().unwrap().value, None);
    }

    #[test]
    fn sensitive_values_are_masked() {
        env::set_var(TEST_SECRET.key, "not-a-number");
        let text: EnvVarValue<String> = TEST_SECRET.required().unwrap();
        assert_eq!(format!("{text:?}"), "***");

        let err = TEST_SECRET.required::<u64>().unwrap_err();
        assert_eq!(err.to_string(), "Failed to parse env var CSM_DASHBOARD_TEST_SECRET: \"***\"");
    }
}
