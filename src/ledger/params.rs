use crate::ledger::errors::{LedgerError, LedgerResult};
use crate::ledger::group::UnitParams;

/// Limits a ledger runtime enforces on every grouped step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerParams {
    /// Flat fee charged to the group sender for each step.
    pub step_fee: u64,
    /// Units an account may be registered for, including zero balances.
    pub max_holdings_per_account: usize,
    /// Maximum byte length of a unit's reference URL.
    pub max_url_len: usize,
    pub max_name_len: usize,
    pub max_unit_name_len: usize,
    pub max_decimals: u32,
}

impl Default for LedgerParams {
    fn default() -> Self {
        Self {
            step_fee: 1_000,
            max_holdings_per_account: 1_000,
            max_url_len: 96,
            max_name_len: 32,
            max_unit_name_len: 8,
            max_decimals: 19,
        }
    }
}

impl LedgerParams {
    /// Parameters without fees, for runtimes that only model custody.
    pub fn feeless() -> Self {
        Self {
            step_fee: 0,
            ..Self::default()
        }
    }

    /// Fee the sender must hold for a group of `steps` steps.
    pub fn group_fee(&self, steps: usize) -> u64 {
        self.step_fee.saturating_mul(steps as u64)
    }

    pub fn validate_unit(&self, params: &UnitParams) -> LedgerResult<()> {
        if params.total_supply == 0 {
            return Err(LedgerError::invalid_parameter(
                "total_supply",
                "must be greater than 0",
            ));
        }
        if params.decimals > self.max_decimals {
            return Err(LedgerError::invalid_parameter(
                "decimals",
                format!("must be at most {}", self.max_decimals),
            ));
        }
        check_len("url", &params.url, self.max_url_len)?;
        check_len("name", &params.name, self.max_name_len)?;
        check_len("unit_name", &params.unit_name, self.max_unit_name_len)?;
        Ok(())
    }
}

fn check_len(field: &str, value: &str, max: usize) -> LedgerResult<()> {
    if value.len() > max {
        return Err(LedgerError::invalid_parameter(
            field,
            format!("{} bytes exceeds the {} byte limit", value.len(), max),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::types::AccountIdentity;

    fn unit(url: &str) -> UnitParams {
        let admin = AccountIdentity::new("ADMIN").unwrap();
        UnitParams {
            total_supply: 1,
            decimals: 0,
            manager: admin.clone(),
            freeze: admin.clone(),
            clawback: admin,
            url: url.to_string(),
            name: "Certificate NFT".to_string(),
            unit_name: "CERT".to_string(),
        }
    }

    #[test]
    fn test_default_limits() {
        let params = LedgerParams::default();
        assert_eq!(params.max_url_len, 96);
        assert_eq!(params.max_name_len, 32);
        assert_eq!(params.max_unit_name_len, 8);
        assert_eq!(params.group_fee(3), 3_000);
        assert_eq!(LedgerParams::feeless().group_fee(3), 0);
    }

    #[test]
    fn test_url_at_limit_is_accepted() {
        let params = LedgerParams::default();
        assert!(params.validate_unit(&unit(&"u".repeat(96))).is_ok());
    }

    #[test]
    fn test_oversized_url_is_rejected() {
        let params = LedgerParams::default();
        let err = params.validate_unit(&unit(&"u".repeat(97))).unwrap_err();
        assert!(matches!(err, LedgerError::InvalidParameter { ref field, .. } if field == "url"));
    }

    #[test]
    fn test_zero_supply_is_rejected() {
        let params = LedgerParams::default();
        let mut zero = unit("https://example.org/cert/1");
        zero.total_supply = 0;
        assert!(params.validate_unit(&zero).is_err());
    }
}
