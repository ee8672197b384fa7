//! Global configuration parsing, validation, and credential loading.

use std::collections::HashSet;
use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{Local, NaiveDateTime, TimeZone};
use serde::Deserialize;
use tracing::warn;

use crate::{AppError, Result};

/// Accepted layout of `buy_time`, e.g. `2024-11-11 10:00:00.000`.
pub const BUY_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// Keychain service holding payment secrets.
const KEYRING_SERVICE: &str = "seckill";

/// One configured buyer identity.
///
/// The payment secret may be left out of the TOML file; it is then loaded
/// from the OS keychain or an environment variable by
/// [`GlobalConfig::load_credentials`].
#[derive(Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct AccountConfig {
    /// Login name; also keys the persisted session and login-code files.
    pub username: String,
    /// Browser user agent sent with every request for this account.
    pub user_agent: String,
    /// Device fingerprint `eid` captured from the checkout page.
    pub eid: String,
    /// Device fingerprint `fp` captured from the checkout page.
    pub fp: String,
    /// Quantity to order per successful submission.
    #[serde(default = "default_seckill_num")]
    pub seckill_num: u32,
    /// Payment password (populated at runtime when absent from the file).
    #[serde(default)]
    pub payment_pwd: String,
}

impl fmt::Debug for AccountConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountConfig")
            .field("username", &self.username)
            .field("user_agent", &self.user_agent)
            .field("eid", &self.eid)
            .field("fp", &self.fp)
            .field("seckill_num", &self.seckill_num)
            .field("payment_pwd", &"<redacted>")
            .finish()
    }
}

fn default_seckill_num() -> u32 {
    2
}

/// Login-code polling settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct LoginConfig {
    /// Delay between confirmation polls.
    #[serde(default = "default_login_poll_seconds")]
    pub poll_interval_seconds: u64,
    /// Polls issued before the login code is considered expired.
    #[serde(default = "default_login_max_polls")]
    pub max_polls: u32,
}

impl Default for LoginConfig {
    fn default() -> Self {
        Self {
            poll_interval_seconds: default_login_poll_seconds(),
            max_polls: default_login_max_polls(),
        }
    }
}

impl LoginConfig {
    /// Delay between confirmation polls as a [`Duration`].
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_seconds)
    }
}

fn default_login_poll_seconds() -> u64 {
    2
}

fn default_login_max_polls() -> u32 {
    85
}

/// Remote endpoints consumed by the client.
///
/// Every field defaults to the production host, so a config file only
/// lists the ones it wants to redirect (e.g. to a staging service).
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "snake_case")]
pub struct Endpoints {
    /// Authoritative server time.
    pub time: String,
    /// Desktop login page; primes the login cookies.
    pub login_page: String,
    /// Login-code image.
    pub qr_show: String,
    /// Login-code confirmation poll.
    pub qr_check: String,
    /// Login ticket validation.
    pub qr_validate: String,
    /// Authenticated page used to probe a restored session.
    pub order_list: String,
    /// Reservation info for a sku.
    pub reserve_info: String,
    /// Purchase button state; yields the routing url once sales open.
    pub item_button: String,
    /// Item page base; `{item_page}/{sku}.html` is used as referer.
    pub item_page: String,
    /// Checkout page.
    pub checkout_page: String,
    /// Order initialization metadata.
    pub order_init: String,
    /// Order submission.
    pub order_submit: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            time: "https://api.m.jd.com/client.action?functionId=queryMaterialProducts&client=wh5"
                .into(),
            login_page: "https://passport.jd.com/new/login.aspx".into(),
            qr_show: "https://qr.m.jd.com/show".into(),
            qr_check: "https://qr.m.jd.com/check".into(),
            qr_validate: "https://passport.jd.com/uc/qrCodeTicketValidation".into(),
            order_list: "https://order.jd.com/center/list.action".into(),
            reserve_info: "https://yushou.jd.com/youshouinfo.action".into(),
            item_button: "https://itemko.jd.com/itemShowBtn".into(),
            item_page: "https://item.jd.com".into(),
            checkout_page: "https://marathon.jd.com/seckill/seckill.action".into(),
            order_init: "https://marathon.jd.com/seckillnew/orderService/pc/init.action".into(),
            order_submit: "https://marathon.jd.com/seckillnew/orderService/pc/submitOrder.action"
                .into(),
        }
    }
}

impl Endpoints {
    /// Item page for `sku_id`, sent as referer on purchase requests.
    #[must_use]
    pub fn item_referer(&self, sku_id: &str) -> String {
        format!("{}/{sku_id}.html", self.item_page.trim_end_matches('/'))
    }
}

fn default_work_count() -> usize {
    5
}

fn default_cookies_dir() -> PathBuf {
    PathBuf::from("./cookies")
}

fn default_poll_interval_ms() -> u64 {
    50
}

/// Global configuration parsed from `config.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// Item being acquired.
    pub sku_id: String,
    /// Local wall-clock instant the sale opens, see [`BUY_TIME_FORMAT`].
    pub buy_time: String,
    /// `buy_time` as Unix milliseconds (derived during validation).
    #[serde(skip)]
    pub buy_time_ms: i64,
    /// Workers spawned per account.
    #[serde(default = "default_work_count")]
    pub work_count: usize,
    /// Replace real purchase requests with a sleep-and-log dry run.
    #[serde(default)]
    pub debug: bool,
    /// Directory holding persisted sessions and login-code images.
    #[serde(default = "default_cookies_dir")]
    pub cookies_dir: PathBuf,
    /// Scheduler poll interval in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Login-code polling settings.
    #[serde(default)]
    pub login: LoginConfig,
    /// Remote endpoints.
    #[serde(default)]
    pub endpoints: Endpoints,
    /// Configured buyer identities.
    pub accounts: Vec<AccountConfig>,
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string and validate it.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Fill in missing payment secrets from the OS keychain with env-var fallback.
    ///
    /// Accounts whose `payment_pwd` is set in the file are left untouched.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if neither keychain nor env var provides a
    /// secret for an account that needs one.
    pub async fn load_credentials(&mut self) -> Result<()> {
        for account in &mut self.accounts {
            if !account.payment_pwd.is_empty() {
                continue;
            }
            let keyring_key = format!("payment_pwd:{}", account.username);
            let env_key = payment_env_key(&account.username);
            account.payment_pwd = load_credential(&keyring_key, &env_key).await?;
        }
        Ok(())
    }

    /// Scheduler poll interval as a [`Duration`].
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Look up a configured account by username.
    #[must_use]
    pub fn account(&self, username: &str) -> Option<&AccountConfig> {
        self.accounts.iter().find(|account| account.username == username)
    }

    fn validate(&mut self) -> Result<()> {
        if self.sku_id.trim().is_empty() {
            return Err(AppError::Config("sku_id must not be empty".into()));
        }

        if self.work_count == 0 {
            return Err(AppError::Config(
                "work_count must be greater than zero".into(),
            ));
        }

        if self.poll_interval_ms == 0 {
            return Err(AppError::Config(
                "poll_interval_ms must be greater than zero".into(),
            ));
        }

        if self.accounts.is_empty() {
            return Err(AppError::Config("accounts must not be empty".into()));
        }

        let mut seen = HashSet::new();
        for account in &self.accounts {
            validate_username(&account.username)?;
            if !seen.insert(account.username.as_str()) {
                return Err(AppError::Config(format!(
                    "duplicate account username: {}",
                    account.username
                )));
            }
            if account.seckill_num == 0 {
                return Err(AppError::Config(format!(
                    "seckill_num for {} must be greater than zero",
                    account.username
                )));
            }
        }

        self.buy_time_ms = parse_buy_time(&self.buy_time)?;
        Ok(())
    }
}

/// Parse a local `buy_time` string into Unix milliseconds.
///
/// # Errors
///
/// Returns `AppError::Config` if the string does not match
/// [`BUY_TIME_FORMAT`] or names a local time that does not exist.
pub fn parse_buy_time(raw: &str) -> Result<i64> {
    let naive = NaiveDateTime::parse_from_str(raw.trim(), BUY_TIME_FORMAT)
        .map_err(|err| AppError::Config(format!("invalid buy_time {raw:?}: {err}")))?;
    Local
        .from_local_datetime(&naive)
        .single()
        .map(|instant| instant.timestamp_millis())
        .ok_or_else(|| AppError::Config(format!("ambiguous local buy_time {raw:?}")))
}

/// Usernames become file names, so they must not escape the cookies dir.
fn validate_username(username: &str) -> Result<()> {
    if username.trim().is_empty() {
        return Err(AppError::Config("account username must not be empty".into()));
    }
    if username.contains(['/', '\\']) || username == "." || username == ".." {
        return Err(AppError::Config(format!(
            "account username {username:?} must not contain path separators"
        )));
    }
    Ok(())
}

/// Environment variable consulted for an account's payment secret.
#[must_use]
pub fn payment_env_key(username: &str) -> String {
    let suffix: String = username
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("SECKILL_PAYMENT_PWD_{suffix}")
}

/// Load a single credential from OS keychain with env-var fallback.
async fn load_credential(keyring_key: &str, env_key: &str) -> Result<String> {
    let key = keyring_key.to_owned();

    // keyring is synchronous I/O.
    let keychain_result = tokio::task::spawn_blocking(move || {
        keyring::Entry::new(KEYRING_SERVICE, &key).and_then(|entry| entry.get_password())
    })
    .await
    .map_err(|err| AppError::Config(format!("keychain task panicked: {err}")))?;

    match keychain_result {
        Ok(value) if !value.is_empty() => return Ok(value),
        Ok(_) => {
            warn!(key = keyring_key, "keychain entry is empty, trying env var");
        }
        Err(err) => {
            warn!(
                key = keyring_key,
                ?err,
                "keychain lookup failed, trying env var"
            );
        }
    }

    match env::var(env_key) {
        Ok(value) if !value.is_empty() => Ok(value),
        _ => Err(AppError::Config(format!(
            "credential {keyring_key} not found in keychain or {env_key} env var"
        ))),
    }
}
