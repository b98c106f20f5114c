use std::fmt;
use std::str::FromStr;

/// ISO 4217 currencies the extractor is allowed to emit (§3: "source system
/// recognizes USD/EUR/GBP/CAD/AUD/INR and normalizes case").
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Currency {
    Usd,
    Eur,
    Gbp,
    Cad,
    Aud,
    Inr,
}

impl Currency {
    pub fn code(&self) -> &'static str {
        match self {
            Currency::Usd => "USD",
            Currency::Eur => "EUR",
            Currency::Gbp => "GBP",
            Currency::Cad => "CAD",
            Currency::Aud => "AUD",
            Currency::Inr => "INR",
        }
    }
}

impl FromStr for Currency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "USD" => Ok(Currency::Usd),
            "EUR" => Ok(Currency::Eur),
            "GBP" => Ok(Currency::Gbp),
            "CAD" => Ok(Currency::Cad),
            "AUD" => Ok(Currency::Aud),
            "INR" => Ok(Currency::Inr),
            other => Err(format!("unrecognized currency: {other:?}")),
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl Default for Currency {
    fn default() -> Self { Currency::Usd }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::Currency;

    #[test]
    fn parses_case_insensitively() {
        assert_eq!(Currency::from_str("inr").unwrap(), Currency::Inr);
        assert_eq!(Currency::from_str("Inr").unwrap(), Currency::Inr);
        assert_eq!(Currency::from_str("INR").unwrap(), Currency::Inr);
    }

    #[test]
    fn rejects_unknown_codes() {
        assert!(Currency::from_str("XYZ").is_err());
    }

    #[test]
    fn default_is_usd() {
        assert_eq!(Currency::default(), Currency::Usd);
    }
}
