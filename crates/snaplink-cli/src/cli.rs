use clap::{Args, Parser, Subcommand, ValueEnum};
use jiff::Timestamp;
use std::fmt::{Display, Formatter};

pub const STORAGE_BACKEND_ENV: &str = "SNAPLINK_STORAGE_BACKEND";
pub const MYSQL_DSN_ENV: &str = "SNAPLINK_MYSQL_DSN";
pub const DEFAULT_PAGE_SIZE_ENV: &str = "SNAPLINK_DEFAULT_PAGE_SIZE";
pub const MAX_PAGE_SIZE_ENV: &str = "SNAPLINK_MAX_PAGE_SIZE";
pub const MAX_ALLOCATION_ATTEMPTS_ENV: &str = "SNAPLINK_MAX_ALLOCATION_ATTEMPTS";
pub const ENTROPY_BYTES_ENV: &str = "SNAPLINK_ENTROPY_BYTES";
pub const BASE_URL_ENV: &str = "SNAPLINK_BASE_URL";
pub const LOG_FORMAT_ENV: &str = "SNAPLINK_LOG_FORMAT";

pub const DEFAULT_BASE_URL: &str = "http://localhost:8080";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StorageBackendArg {
    #[value(name = "in-memory")]
    InMemory,
    #[value(name = "mysql")]
    Mysql,
}

impl Display for StorageBackendArg {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageBackendArg::InMemory => write!(f, "in-memory"),
            StorageBackendArg::Mysql => write!(f, "mysql"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

/// Administrative command line for snaplink.
#[derive(Debug, Parser)]
#[command(name = "snaplink", version)]
pub struct Cli {
    #[command(flatten)]
    pub config: Config,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Args)]
pub struct Config {
    #[arg(
        long,
        global = true,
        env = STORAGE_BACKEND_ENV,
        value_enum,
        default_value_t = StorageBackendArg::InMemory
    )]
    pub storage: StorageBackendArg,

    #[arg(long, global = true, env = MYSQL_DSN_ENV, required_if_eq("storage", "mysql"))]
    pub mysql_dsn: Option<String>,

    /// Page size used when a listing does not ask for one.
    #[arg(long, global = true, env = DEFAULT_PAGE_SIZE_ENV, default_value_t = 20)]
    pub default_page_size: usize,

    #[arg(long, global = true, env = MAX_PAGE_SIZE_ENV, default_value_t = 100)]
    pub max_page_size: usize,

    /// Candidates drawn per generated short code before giving up.
    #[arg(long, global = true, env = MAX_ALLOCATION_ATTEMPTS_ENV, default_value_t = 5)]
    pub max_allocation_attempts: usize,

    /// Random bytes behind each generated short code.
    #[arg(
        long,
        global = true,
        env = ENTROPY_BYTES_ENV,
        default_value_t = 6,
        value_parser = clap::value_parser!(u8).range(3..=16)
    )]
    pub entropy_bytes: u8,

    /// Public base URL that short codes are appended to.
    #[arg(long, global = true, env = BASE_URL_ENV, default_value = DEFAULT_BASE_URL)]
    pub base_url: String,

    #[arg(long, global = true, env = LOG_FORMAT_ENV, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Args)]
pub struct PageArgs {
    /// Cursor returned as `next_cursor` by the previous page.
    #[arg(long)]
    pub cursor: Option<String>,

    #[arg(long, allow_negative_numbers = true)]
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Apply the MySQL schema migrations.
    Migrate,
    /// Shorten a URL.
    Shorten {
        url: String,
        #[arg(long)]
        alias: Option<String>,
        /// Expire this many seconds from now.
        #[arg(long, conflicts_with = "expires_at")]
        expires_in: Option<i64>,
        /// Expire at an RFC 3339 instant.
        #[arg(long)]
        expires_at: Option<Timestamp>,
        #[arg(long, default_value_t = 301)]
        redirect_type: u16,
    },
    /// Show a short link.
    GetLink { code: String },
    /// List short links, newest first.
    ListLinks {
        #[arg(long)]
        active: Option<bool>,
        #[command(flatten)]
        page: PageArgs,
    },
    /// Deactivate a short link.
    Deactivate { code: String },
    /// Redeem a short link once, counting a click.
    Redeem { code: String },
    CreateRole {
        #[arg(long)]
        name: String,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        created_by: Option<String>,
    },
    ListRoles {
        #[arg(long)]
        include_deleted: bool,
        #[arg(long)]
        active: Option<bool>,
        #[command(flatten)]
        page: PageArgs,
    },
    /// Change a role; unset flags leave fields as they are.
    UpdateRole {
        id: u64,
        #[arg(long)]
        name: Option<String>,
        /// A blank value clears the description.
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        active: Option<bool>,
        #[arg(long)]
        updated_by: Option<String>,
    },
    DeleteRole {
        id: u64,
        #[arg(long)]
        deleted_by: Option<String>,
    },
    CreateUser {
        #[arg(long)]
        fullname: String,
        #[arg(long)]
        role_id: u64,
        #[arg(long)]
        email: String,
        /// Pre-computed password hash.
        #[arg(long)]
        password_hash: String,
        #[arg(long)]
        created_by: Option<String>,
    },
    GetUser {
        id: u64,
        #[arg(long)]
        include_deleted: bool,
    },
    FindUser {
        email: String,
        #[arg(long)]
        include_deleted: bool,
    },
    ListUsers {
        #[arg(long)]
        role_id: Option<u64>,
        #[arg(long)]
        include_deleted: bool,
        #[arg(long)]
        active: Option<bool>,
        #[command(flatten)]
        page: PageArgs,
    },
    /// Change a user; unset flags leave fields as they are.
    UpdateUser {
        id: u64,
        #[arg(long)]
        fullname: Option<String>,
        #[arg(long)]
        role_id: Option<u64>,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        password_hash: Option<String>,
        #[arg(long)]
        active: Option<bool>,
        #[arg(long)]
        updated_by: Option<String>,
    },
    DeleteUser {
        id: u64,
        #[arg(long)]
        deleted_by: Option<String>,
    },
}
