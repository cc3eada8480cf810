//! # Account settings
//!
//! A strongly-typed, versioned preferences record bound to the signed-in
//! identity. It lives inside the sync repo at
//! `<account>/sync/Settings.json`, encrypted under the master key, so it
//! follows the user across devices and nobody without `MK` can read even
//! the field names.
//!
//! Load semantics: a missing file yields defaults; unknown fields in a
//! present file are ignored but preserved on save; the seeded
//! exchange-rate sources are topped up in a stable order; `fullName` is
//! recomputed from its parts on every load.

pub mod categories;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::crypto::Envelope;
use crate::identity::keys::MasterKey;
use crate::store::{files, AccountDir};

/// ISO-4217 numeric code for US dollars, the default display currency.
pub const CURRENCY_NUM_USD: u32 = 840;

/// Default threshold above which spending asks for the PIN.
const DEFAULT_SPEND_REQUIRE_PIN_SATOSHIS: i64 = 5_000_000;

/// Per-currency exchange-rate source defaults, appended in this order on
/// load when absent.
const EXCHANGE_DEFAULTS: &[(u32, &str)] = &[
    (CURRENCY_NUM_USD, "Bitstamp"),
    (124, "Coinbase"), // CAD
    (156, "Coinbase"), // CNY
    (978, "Coinbase"), // EUR
    (826, "Coinbase"), // GBP
    (484, "Coinbase"), // MXN
];

/// Which exchange quotes a currency's rate.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeRateSource {
    /// ISO-4217 numeric currency code
    #[serde(rename = "numCurrency")]
    pub currency_num: u32,
    /// Source name, e.g. `"Bitstamp"`
    #[serde(rename = "exchangeRateSource")]
    pub source: String,
}

/// How bitcoin amounts are displayed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BitcoinDenomination {
    /// 0 = BTC, 1 = mBTC, 2 = bits
    #[serde(rename = "denominationType")]
    pub denomination_type: u32,
    /// Satoshis per displayed unit
    pub satoshi: i64,
}

impl Default for BitcoinDenomination {
    fn default() -> Self {
        // mBTC
        Self {
            denomination_type: 1,
            satoshi: 100_000,
        }
    }
}

/// The versioned, encrypted per-account preferences record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Given name, shown on payment requests when enabled
    #[serde(rename = "firstName", skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    /// Family name
    #[serde(rename = "lastName", skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    /// Nickname
    #[serde(rename = "nickname", skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,
    /// Derived display name; recomputed from the parts on load
    #[serde(rename = "fullName", skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,

    /// Login PIN (digits only); this record is its single source of truth
    #[serde(rename = "PIN", skip_serializing_if = "Option::is_none")]
    pub pin: Option<String>,

    /// Attach the name to outgoing payments
    #[serde(rename = "nameOnPayments")]
    pub name_on_payments: bool,
    /// Idle minutes before automatic logout
    #[serde(rename = "minutesAutoLogout")]
    pub minutes_auto_logout: u32,
    /// How often the user has been nagged to set recovery
    #[serde(rename = "recoveryReminderCount")]
    pub recovery_reminder_count: u32,
    /// BCP-47-ish language tag (not enforced)
    pub language: String,
    /// ISO-4217 numeric code of the display currency
    #[serde(rename = "numCurrency")]
    pub num_currency: u32,
    /// Ordered per-currency rate sources
    #[serde(rename = "exchangeRateSources")]
    pub exchange_rate_sources: Vec<ExchangeRateSource>,
    /// Display denomination
    #[serde(rename = "bitcoinDenomination")]
    pub bitcoin_denomination: BitcoinDenomination,
    /// Show expert wallet features
    #[serde(rename = "advancedFeatures")]
    pub advanced_features: bool,

    /// Enforce a daily spend limit
    #[serde(rename = "dailySpendLimitEnabled")]
    pub daily_spend_limit_enabled: bool,
    /// The daily limit, in satoshis
    #[serde(rename = "dailySpendLimitSatoshis")]
    pub daily_spend_limit_satoshis: i64,
    /// Ask for the PIN on large spends
    #[serde(rename = "spendRequirePinEnabled")]
    pub spend_require_pin_enabled: bool,
    /// The PIN-on-spend threshold, in satoshis
    #[serde(rename = "spendRequirePinSatoshis")]
    pub spend_require_pin_satoshis: i64,
    /// Disable PIN-based login entirely
    #[serde(rename = "disablePINLogin")]
    pub disable_pin_login: bool,

    /// Unknown fields, preserved on round-trip
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            first_name: None,
            last_name: None,
            nickname: None,
            full_name: None,
            pin: None,
            name_on_payments: false,
            minutes_auto_logout: 60,
            recovery_reminder_count: 0,
            language: "en".to_string(),
            num_currency: CURRENCY_NUM_USD,
            exchange_rate_sources: EXCHANGE_DEFAULTS
                .iter()
                .map(|(currency_num, source)| ExchangeRateSource {
                    currency_num: *currency_num,
                    source: source.to_string(),
                })
                .collect(),
            bitcoin_denomination: BitcoinDenomination::default(),
            advanced_features: false,
            daily_spend_limit_enabled: false,
            daily_spend_limit_satoshis: 0,
            spend_require_pin_enabled: true,
            spend_require_pin_satoshis: DEFAULT_SPEND_REQUIRE_PIN_SATOSHIS,
            disable_pin_login: false,
            extra: serde_json::Map::new(),
        }
    }
}

impl Settings {
    /// Load the record for an account, or defaults if none was saved.
    pub fn load(account: &AccountDir, mk: &MasterKey) -> Result<Self> {
        let envelope: Option<Envelope> = files::read_json_opt(&account.settings_path())?;
        let mut settings = match envelope {
            Some(envelope) => envelope.open_json::<Settings>(&mk.encryption_key())?,
            None => Settings::default(),
        };
        settings.normalize();
        Ok(settings)
    }

    /// Validate and persist the record, encrypted under the master key.
    pub fn save(&self, account: &AccountDir, mk: &MasterKey) -> Result<()> {
        if let Some(pin) = &self.pin {
            if pin.is_empty() || !pin.chars().all(|c| c.is_ascii_digit()) {
                return Err(Error::NonNumericPin);
            }
        }
        account.sync_dir()?;
        let envelope = Envelope::seal_json(self, &mk.encryption_key())?;
        files::write_json(&account.settings_path(), &envelope)
    }

    /// Whether `candidate` matches the stored PIN. `false` when none is
    /// set.
    pub fn verify_pin(&self, candidate: &str) -> bool {
        self.pin.as_deref() == Some(candidate)
    }

    /// Top up missing default exchange sources and recompute `fullName`.
    fn normalize(&mut self) {
        for (currency_num, source) in EXCHANGE_DEFAULTS {
            if !self
                .exchange_rate_sources
                .iter()
                .any(|s| s.currency_num == *currency_num)
            {
                self.exchange_rate_sources.push(ExchangeRateSource {
                    currency_num: *currency_num,
                    source: source.to_string(),
                });
            }
        }
        self.full_name = compose_full_name(
            self.first_name.as_deref(),
            self.last_name.as_deref(),
            self.nickname.as_deref(),
        );
    }
}

/// `"<first> <last> - <nick>"`, skipping missing parts and their
/// separators. A pure function over the three inputs.
pub fn compose_full_name(
    first: Option<&str>,
    last: Option<&str>,
    nick: Option<&str>,
) -> Option<String> {
    let first = first.filter(|s| !s.is_empty());
    let last = last.filter(|s| !s.is_empty());
    let nick = nick.filter(|s| !s.is_empty());

    if first.is_none() && last.is_none() && nick.is_none() {
        return None;
    }

    let mut out = String::new();
    if let Some(first) = first {
        out.push_str(first);
    }
    if let Some(last) = last {
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(last);
    }
    if let Some(nick) = nick {
        if !out.is_empty() {
            out.push_str(" - ");
        }
        out.push_str(nick);
    }
    Some(out)
}

// ============================================================================
// TESTS
// ============================================================================
