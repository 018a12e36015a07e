#![forbid(unsafe_code)]

use anyhow::{Result, anyhow};
use log::{info, warn, error, LevelFilter};
use log4rs::append::console::ConsoleAppender;
use log4rs::config::{Appender, Config as LogConfig, Root};
use log4rs::encode::pattern::PatternEncoder;
use serde::Deserialize;
use std::{env, fs, path::Path};
use fs_mistrust::Mistrust;
use lazy_static::lazy_static;
use structopt::StructOpt;

// NMS Utilities
use crate::utils::errors::Errors;
use crate::utils::nms_utils::get_absolute_path;

// ***************************************************************************
//                                Constants
// ***************************************************************************
// Directory and file locations. Unless otherwise noted, all files and directories
// are relative to the root directory.  Nothing under the root is required to
// exist and nothing is written there except by --create-dirs-only.
const ENV_NMS_ROOT_DIR     : &str = "NMS_ROOT_DIR";
const DEFAULT_ROOT_DIR     : &str = "~/.nms";
const CONFIG_DIR           : &str = "/config";
const CERTS_DIR            : &str = "/certs";
const LOG4RS_CONFIG_FILE   : &str = "/log4rs.yml"; // relative to config dir
const NMS_CONFIG_FILE      : &str = "/nms.toml";   // relative to config dir
pub const CERT_FILE        : &str = "/cert.pem";   // relative to certs dir
pub const KEY_FILE         : &str = "/key.pem";    // relative to certs dir

// Networking.
const DEFAULT_HTTP_ADDR    : &str = "http://localhost";
const DEFAULT_HTTP_PORT    : u16  = 8080;

// Fallback console logging when no log4rs file is installed.
const CONSOLE_LOG_PATTERN  : &str = "{d(%Y-%m-%dT%H:%M:%S%.3fZ)(utc)} {h({l})} {t} - {m}{n}";

// ***************************************************************************
//                             Static Variables
// ***************************************************************************
// Assign the command line arguments BEFORE RUNTIME_CTX is initialized in main.
lazy_static! {
    pub static ref NMS_ARGS: NmsArgs = init_nms_args();
}

// Calculate the data directories BEFORE RUNTIME_CTX is initialized in main.
lazy_static! {
    pub static ref NMS_DIRS: NmsDirs = init_nms_dirs();
}

// ***************************************************************************
//                             Directory Structs
// ***************************************************************************
// ---------------------------------------------------------------------------
// NmsDirs:
// ---------------------------------------------------------------------------
#[derive(Debug)]
pub struct NmsDirs {
    pub root_dir: String,
    pub config_dir: String,
    pub certs_dir: String,
}

impl NmsDirs {
    /** Lay out the data directories under the root without touching the
     * file system.
     */
    pub fn from_root(root_dir: String) -> Self {
        let config_dir = root_dir.clone() + CONFIG_DIR;
        let certs_dir = root_dir.clone() + CERTS_DIR;
        NmsDirs {root_dir, config_dir, certs_dir}
    }
}

// ***************************************************************************
//                               Config Structs
// ***************************************************************************
// ---------------------------------------------------------------------------
// NmsArgs:
// ---------------------------------------------------------------------------
#[derive(Debug, StructOpt)]
#[structopt(name = "nms_args", about = "Command line arguments for NMS Server.")]
pub struct NmsArgs {
    /// Specify NMS's root data directory.
    ///
    /// Optional configuration files are read from this directory.  The
    /// directory does not need to exist.
    #[structopt(short, long)]
    pub root_dir: Option<String>,

    /// Create the data directories and then exit.
    ///
    /// The data directories will be rooted at a root directory calculated
    /// using the following priority order:
    ///
    ///   1. If set, the value of the NMS_ROOT_DIR environment,
    ///
    ///   2. Otherwise, if set, the value of the --root_dir command line argument,
    ///
    ///   3. Otherwise, ~/.nms
    ///
    #[structopt(short, long)]
    pub create_dirs_only: bool,
}

// ---------------------------------------------------------------------------
// Parms:
// ---------------------------------------------------------------------------
#[derive(Debug)]
#[allow(dead_code)]
pub struct Parms {
    pub config_file: String,
    pub config: Config,
}

// ---------------------------------------------------------------------------
// RuntimeCtx:
// ---------------------------------------------------------------------------
#[derive(Debug)]
#[allow(dead_code)]
pub struct RuntimeCtx {
    pub parms: Parms,
    pub nms_args: &'static NmsArgs,
    pub nms_dirs: &'static NmsDirs,
}

// ---------------------------------------------------------------------------
// Config:
// ---------------------------------------------------------------------------
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    pub title: String,
    pub http_addr: String,
    pub http_port: u16,
    pub enable_tls: bool,
}

impl Config {
    pub fn new() -> Self {
        Config::default()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            title: "NMS Server".to_string(),
            http_addr: DEFAULT_HTTP_ADDR.to_string(),
            http_port: DEFAULT_HTTP_PORT,
            enable_tls: false,
        }
    }
}

// ***************************************************************************
//                            Directory Functions
// ***************************************************************************
// ---------------------------------------------------------------------------
// init_nms_args:
// ---------------------------------------------------------------------------
/** Get the command line arguments. */
fn init_nms_args() -> NmsArgs {
    let args = NmsArgs::from_args();
    println!("{:?}", args);
    args
}

// ---------------------------------------------------------------------------
// init_nms_dirs:
// ---------------------------------------------------------------------------
/** Calculate the external data directories. */
fn init_nms_dirs() -> NmsDirs {
    let root_dir = resolve_root_dir(env::var(ENV_NMS_ROOT_DIR).ok(), NMS_ARGS.root_dir.clone());
    NmsDirs::from_root(root_dir)
}

// ---------------------------------------------------------------------------
// resolve_root_dir:
// ---------------------------------------------------------------------------
fn resolve_root_dir(env_root: Option<String>, arg_root: Option<String>) -> String {
    // Order of precedence:
    //  1. Environment variable
    //  2. Command line --root-dir argument
    //  3. Default location
    //
    let root_dir = env_root
        .or(arg_root)
        .unwrap_or_else(|| DEFAULT_ROOT_DIR.to_string());

    // Canonicalize the path.
    get_absolute_path(&root_dir)
}

// ---------------------------------------------------------------------------
// create_nms_dirs:
// ---------------------------------------------------------------------------
/** Create whichever data directories don't already exist.  Only called when
 * the --create-dirs-only flag is set.  Existing directories are accepted as is.
 */
pub fn create_nms_dirs(dirs: &NmsDirs) -> Result<()> {
    let mistrust = get_mistrust()?;
    make_nms_dir(&dirs.root_dir, "root directory", &mistrust)?;
    make_nms_dir(&dirs.config_dir, "config directory", &mistrust)?;
    make_nms_dir(&dirs.certs_dir, "certs directory", &mistrust)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// make_nms_dir:
// ---------------------------------------------------------------------------
/** Check that the path is absolute and, if it exists, that it's a directory.
 * If it doesn't exist, create it.  The mistrust package creates directories
 * with 0o700 permissions.
 */
fn make_nms_dir(dir: &str, msgname: &str, mistrust: &Mistrust) -> Result<()> {
    let path = Path::new(dir);
    if !path.is_absolute() {
        return Err(anyhow!("The NMS {} path must be absolute: {}", msgname, dir));
    }

    if path.exists() {
        if !path.is_dir() {
            return Err(anyhow!("The NMS {} path must be a directory: {}", msgname, dir));
        }
        info!("Using existing {}: {}", msgname, dir);
    } else {
        mistrust.make_directory(path)
            .map_err(|e| anyhow!("Make directory error for {:?}: {}", path, e))?;
        info!("Created {}: {}", msgname, dir);
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// get_mistrust:
// ---------------------------------------------------------------------------
/** Configure a new mistrust object for directory creation. */
fn get_mistrust() -> Result<Mistrust> {
    Mistrust::builder()
        .ignore_prefix(get_absolute_path("~"))
        .trust_group(0)
        .build()
        .map_err(|e| anyhow!("Mistrust configuration error: {}", e))
}

// ***************************************************************************
//                               Log Functions
// ***************************************************************************
// ---------------------------------------------------------------------------
// init_log:
// ---------------------------------------------------------------------------
/** Initialize log4rs from the config directory's log4rs.yml.  If no such
 * file has been installed, fall back to info level console logging.
 */
pub fn init_log() {
    let logconfig = NMS_DIRS.config_dir.clone() + LOG4RS_CONFIG_FILE;
    let result = load_log_config(&logconfig)
        .and_then(|c| log4rs::init_config(c).map_err(|e| anyhow!(e)));
    match result {
        Ok(_) => (),
        Err(e) => {
            println!("{}", e);
            let s = format!("{}", Errors::Log4rsInitialization(logconfig));
            panic!("{}", s);
        },
    }

    if Path::new(&logconfig).exists() {
        info!("Log4rs initialized using: {}", logconfig);
    } else {
        info!("Log4rs file {} not found, logging to console.", logconfig);
    }
}

// ---------------------------------------------------------------------------
// load_log_config:
// ---------------------------------------------------------------------------
fn load_log_config(logconfig: &str) -> Result<LogConfig> {
    if !Path::new(logconfig).exists() {
        return console_log_config();
    }
    log4rs::config::load_config_file(logconfig, Default::default())
}

// ---------------------------------------------------------------------------
// console_log_config:
// ---------------------------------------------------------------------------
fn console_log_config() -> Result<LogConfig> {
    let stdout = ConsoleAppender::builder()
        .encoder(Box::new(PatternEncoder::new(CONSOLE_LOG_PATTERN)))
        .build();
    LogConfig::builder()
        .appender(Appender::builder().build("stdout", Box::new(stdout)))
        .build(Root::builder().appender("stdout").build(LevelFilter::Info))
        .map_err(|e| anyhow!("{}", e))
}

/// ***************************************************************************
//                             Parms Functions
// ***************************************************************************
// ---------------------------------------------------------------------------
// load_parms:
// ---------------------------------------------------------------------------
/** Retrieve the application parameters from the configuration file in the
 * config directory.  Default values are used when the file doesn't exist or
 * can't be read; a file that exists but doesn't parse is an error.
 */
fn load_parms(config_dir: &str) -> Result<Parms> {
    let config_file = get_absolute_path(&(config_dir.to_string() + NMS_CONFIG_FILE));
    if !Path::new(&config_file).exists() {
        info!("No configuration file at {}. Using default values.", config_file);
        return Ok(Parms { config_file: Default::default(), config: Config::new() });
    }

    // Read the cofiguration file.
    info!("{}", Errors::ReadingConfigFile(config_file.clone()));
    let contents = match fs::read_to_string(&config_file) {
        Ok(c) => c,
        Err(e) => {
            warn!("Unable to read configuration at {}: {}. Using default values.", config_file, e);
            return Ok(Parms { config_file: Default::default(), config: Config::new() });
        }
    };

    let config = parse_config(&contents, &config_file)?;
    Ok(Parms { config_file, config })
}

// ---------------------------------------------------------------------------
// parse_config:
// ---------------------------------------------------------------------------
/** Parse the toml configuration.  Keys missing from the file take their
 * default values.
 */
fn parse_config(contents: &str, config_file: &str) -> Result<Config> {
    match toml::from_str(contents) {
        Ok(c)  => Ok(c),
        Err(e) => {
            let msg = format!("{}\n   {}", Errors::TOMLParseError(config_file.to_string()), e);
            error!("{}", msg);
            Err(anyhow!(msg))
        }
    }
}

// ***************************************************************************
//                             Config Functions
// ***************************************************************************
// ---------------------------------------------------------------------------
// init_runtime_context:
// ---------------------------------------------------------------------------
pub fn init_runtime_context() -> RuntimeCtx {
    // The application aborts if the configuration file can't be parsed.
    let parms = match load_parms(&NMS_DIRS.config_dir) {
        Ok(p) => p,
        Err(e) => panic!("FAILED to read configuration file: {}", e),
    };
    RuntimeCtx {parms, nms_args: &NMS_ARGS, nms_dirs: &NMS_DIRS}
}

// ***************************************************************************
//                                  Tests
// ***************************************************************************
#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    fn trusting() -> Mistrust {
        Mistrust::new_dangerously_trust_everyone()
    }

    #[test]
    fn default_config() {
        let config = Config::new();
        assert_eq!(config.title, "NMS Server");
        assert_eq!(config.http_addr, "http://localhost");
        assert_eq!(config.http_port, 8080);
        assert!(!config.enable_tls);
    }

    #[test]
    fn partial_config_fills_defaults() {
        let config = parse_config("http_port = 9000\nenable_tls = true\n", "nms.toml").unwrap();
        assert_eq!(config.http_port, 9000);
        assert!(config.enable_tls);
        assert_eq!(config.title, "NMS Server");
        assert_eq!(config.http_addr, "http://localhost");
    }

    #[test]
    fn bad_config_is_rejected() {
        let e = parse_config("http_port = \"not a port\"", "/x/nms.toml").unwrap_err();
        assert!(e.to_string().contains("Unable to parse TOML file: /x/nms.toml"));
    }

    #[test]
    fn env_root_wins_over_arg() {
        let root = resolve_root_dir(Some("/srv/env".to_string()), Some("/srv/arg".to_string()));
        assert_eq!(root, "/srv/env");

        let root = resolve_root_dir(None, Some("/srv/arg".to_string()));
        assert_eq!(root, "/srv/arg");

        let root = resolve_root_dir(None, None);
        assert!(root.ends_with("/.nms"));
    }

    #[test]
    fn dirs_are_laid_out_under_root() {
        let dirs = NmsDirs::from_root("/srv/nms".to_string());
        assert_eq!(dirs.config_dir, "/srv/nms/config");
        assert_eq!(dirs.certs_dir, "/srv/nms/certs");
    }

    #[test]
    fn missing_root_uses_defaults_and_writes_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("absent");
        let dirs = NmsDirs::from_root(root.to_str().unwrap().to_string());

        let parms = load_parms(&dirs.config_dir).unwrap();
        assert_eq!(parms.config.http_port, 8080);
        assert!(parms.config_file.is_empty());
        assert!(!root.exists());
    }

    #[test]
    fn config_file_is_read_when_present() {
        let tmp = tempfile::tempdir().unwrap();
        let dirs = NmsDirs::from_root(tmp.path().to_str().unwrap().to_string());
        fs::create_dir(&dirs.config_dir).unwrap();
        fs::write(dirs.config_dir.clone() + NMS_CONFIG_FILE, "title = \"Greeter\"\n").unwrap();

        let parms = load_parms(&dirs.config_dir).unwrap();
        assert_eq!(parms.config.title, "Greeter");
        assert_eq!(parms.config.http_port, 8080);
        assert!(parms.config_file.ends_with("/config/nms.toml"));
    }

    #[test]
    fn open_permissions_are_accepted() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("shared");
        fs::create_dir(&root).unwrap();
        fs::set_permissions(&root, fs::Permissions::from_mode(0o755)).unwrap();

        make_nms_dir(root.to_str().unwrap(), "root directory", &trusting()).unwrap();
        let mode = fs::metadata(&root).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
    }

    #[test]
    fn missing_dir_is_created() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("config");

        make_nms_dir(dir.to_str().unwrap(), "config directory", &trusting()).unwrap();
        assert!(dir.is_dir());
    }

    #[test]
    fn relative_dir_is_rejected() {
        let e = make_nms_dir("relative/dir", "test directory", &trusting()).unwrap_err();
        assert!(e.to_string().contains("must be absolute"));
    }

    #[test]
    fn file_is_not_a_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("nms.toml");
        fs::write(&file, "").unwrap();
        let e = make_nms_dir(file.to_str().unwrap(), "test directory", &trusting()).unwrap_err();
        assert!(e.to_string().contains("must be a directory"));
    }

    #[test]
    fn missing_log4rs_file_falls_back_to_console() {
        let tmp = tempfile::tempdir().unwrap();
        let logconfig = tmp.path().join("log4rs.yml");

        let config = load_log_config(logconfig.to_str().unwrap()).unwrap();
        assert_eq!(config.root().level(), LevelFilter::Info);
        assert_eq!(config.appenders().len(), 1);
        assert_eq!(config.appenders()[0].name(), "stdout");
    }

    #[test]
    fn log4rs_file_is_used_when_present() {
        let tmp = tempfile::tempdir().unwrap();
        let logconfig = tmp.path().join("log4rs.yml");
        fs::write(&logconfig, "appenders:\n  stdout:\n    kind: console\nroot:\n  level: warn\n  appenders:\n    - stdout\n").unwrap();

        let config = load_log_config(logconfig.to_str().unwrap()).unwrap();
        assert_eq!(config.root().level(), LevelFilter::Warn);
    }
}
