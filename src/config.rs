//! Command line / environment configuration.
//!
//! Every flag can also be supplied through an environment variable so the
//! binary runs unchanged from a cron job or a CI schedule. The parsed [`Cli`]
//! is validated once into an immutable [`Config`] which is then passed by
//! reference to every component.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use url::Url;

use crate::error::ConfigError;
use crate::notify::DEFAULT_CAP;
use crate::pool::DEFAULT_WIDTH;
use crate::types::PageNumber;

pub const PAGE_PLACEHOLDER: &str = "{page}";
pub const ID_PLACEHOLDER: &str = "{id}";

const DEFAULT_LISTING_URL: &str =
    "https://prisync.me/admin/fetchField/siteList/Site_page/{page}/Site_sort/id.desc";
const DEFAULT_DETAIL_URL: &str = "https://prisync.me/admin/fetchField/site?site_id={id}";

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreKind {
    /// Local CSV file
    Csv,
    /// Google Sheets worksheet
    Sheets,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum MergeMode {
    /// Append new rows after existing ones, oldest id first
    Append,
    /// Rewrite the whole table, newest id first
    Overwrite,
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "fieldwatch",
    about = "Scrape the fetch-field listing and report sites without a seller"
)]
pub struct Cli {
    /// Raw session cookie string (`k=v; k2=v2`) for the admin listing
    #[arg(long, env = "PRISYNC_COOKIE", default_value = "", hide_env_values = true)]
    pub cookie: String,

    /// Listing url, `{page}` is replaced with the page number
    #[arg(long, env = "FIELDWATCH_LISTING_URL", default_value = DEFAULT_LISTING_URL)]
    pub listing_url: String,

    /// Detail link template, `{id}` is replaced with the canonical site id
    #[arg(long, env = "FIELDWATCH_DETAIL_URL", default_value = DEFAULT_DETAIL_URL)]
    pub detail_url: String,

    /// First listing page (inclusive)
    #[arg(long, env = "FIELDWATCH_START_PAGE", default_value_t = 1)]
    pub start_page: PageNumber,

    /// Last listing page (inclusive)
    #[arg(long, env = "FIELDWATCH_END_PAGE", default_value_t = 92)]
    pub end_page: PageNumber,

    /// Number of concurrent page workers
    #[arg(long, env = "FIELDWATCH_CONCURRENCY", default_value_t = DEFAULT_WIDTH)]
    pub concurrency: usize,

    /// Per-request timeout in seconds
    #[arg(long, env = "FIELDWATCH_TIMEOUT_SECS", default_value_t = 30)]
    pub timeout_secs: u64,

    /// Where known site ids are persisted
    #[arg(long, env = "FIELDWATCH_STORE", value_enum, default_value_t = StoreKind::Csv)]
    pub store: StoreKind,

    /// How new rows are merged into the store
    #[arg(long, env = "FIELDWATCH_MERGE", value_enum, default_value_t = MergeMode::Append)]
    pub merge: MergeMode,

    /// CSV file used by the csv store
    #[arg(long, env = "FIELDWATCH_CSV_PATH", default_value = "known_sites.csv")]
    pub csv_path: PathBuf,

    /// Spreadsheet id used by the sheets store
    #[arg(long, env = "FIELDWATCH_SPREADSHEET_ID")]
    pub spreadsheet_id: Option<String>,

    /// Worksheet title used by the sheets store
    #[arg(long, env = "FIELDWATCH_SHEET_NAME", default_value = "Sheet1")]
    pub sheet_name: String,

    /// Numeric worksheet id (gid) used for header insertion
    #[arg(long, env = "FIELDWATCH_SHEET_GID", default_value_t = 0)]
    pub sheet_gid: i64,

    /// OAuth access token for the sheets store
    #[arg(long, env = "GOOGLE_ACCESS_TOKEN", hide_env_values = true)]
    pub google_access_token: Option<String>,

    /// Incoming webhook that receives the summary; notifications are skipped when unset
    #[arg(long, env = "SLACK_WEBHOOK", hide_env_values = true)]
    pub webhook: Option<String>,

    /// Maximum number of sites listed in one notification
    #[arg(long, env = "FIELDWATCH_NOTIFY_CAP", default_value_t = DEFAULT_CAP)]
    pub notify_cap: usize,
}

/// String that never shows up in `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreSettings {
    Csv {
        path: PathBuf,
    },
    Sheets {
        spreadsheet_id: String,
        sheet_name: String,
        sheet_gid: i64,
        access_token: Secret,
    },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub cookie: Secret,
    pub listing_url: String,
    pub detail_url: String,
    pub start_page: PageNumber,
    pub end_page: PageNumber,
    pub concurrency: usize,
    pub timeout: Duration,
    pub store: StoreSettings,
    pub merge: MergeMode,
    pub webhook: Option<Url>,
    pub notify_cap: usize,
}

impl Config {
    pub fn from_cli(cli: Cli) -> Result<Self, ConfigError> {
        if cli.start_page > cli.end_page {
            return Err(ConfigError::EmptyPageRange {
                start: cli.start_page,
                end: cli.end_page,
            });
        }
        if cli.concurrency == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }
        check_template("listing url", &cli.listing_url, PAGE_PLACEHOLDER)?;
        check_template("detail url", &cli.detail_url, ID_PLACEHOLDER)?;

        let store = match cli.store {
            StoreKind::Csv => StoreSettings::Csv { path: cli.csv_path },
            StoreKind::Sheets => StoreSettings::Sheets {
                spreadsheet_id: non_empty(cli.spreadsheet_id)
                    .ok_or(ConfigError::MissingSetting("spreadsheet id"))?,
                sheet_name: cli.sheet_name,
                sheet_gid: cli.sheet_gid,
                access_token: non_empty(cli.google_access_token)
                    .map(Secret::new)
                    .ok_or(ConfigError::MissingSetting("google access token"))?,
            },
        };

        let webhook = non_empty(cli.webhook)
            .map(|raw| {
                Url::parse(&raw).map_err(|e| ConfigError::InvalidUrl {
                    name: "webhook",
                    reason: e.to_string(),
                })
            })
            .transpose()?;

        Ok(Self {
            cookie: Secret::new(cli.cookie),
            listing_url: cli.listing_url,
            detail_url: cli.detail_url,
            start_page: cli.start_page,
            end_page: cli.end_page,
            concurrency: cli.concurrency,
            timeout: Duration::from_secs(cli.timeout_secs.max(1)),
            store,
            merge: cli.merge,
            webhook,
            notify_cap: cli.notify_cap,
        })
    }

    pub fn pages(&self) -> std::ops::RangeInclusive<PageNumber> {
        self.start_page..=self.end_page
    }
}

pub fn page_url(template: &str, page: PageNumber) -> String {
    template.replace(PAGE_PLACEHOLDER, &page.to_string())
}

pub fn detail_link(template: &str, canonical_id: &str) -> String {
    template.replace(ID_PLACEHOLDER, canonical_id)
}

fn check_template(
    name: &'static str,
    template: &str,
    placeholder: &'static str,
) -> Result<(), ConfigError> {
    if !template.contains(placeholder) {
        return Err(ConfigError::MissingPlaceholder { name, placeholder });
    }
    Url::parse(&template.replace(placeholder, "1")).map_err(|e| ConfigError::InvalidUrl {
        name,
        reason: e.to_string(),
    })?;
    Ok(())
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
