//! Configuration types for the chat application.
//!
//! Settings are resolved from, in increasing priority: built-in defaults, the
//! `KBCHAT_BASE_URL` environment variable (base URL only), a YAML file named with
//! `--config`, and command-line flags.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use arrrg_derive::CommandLine;
use serde::Deserialize;

use crate::client::{BASE_URL_ENV, DEFAULT_BASE_URL};
use crate::error::{Error, Result};
use crate::transport;

/// Command-line arguments for the kbchat tool.
#[derive(CommandLine, Debug, Default, PartialEq, Eq)]
pub struct ChatArgs {
    /// Service base URL.
    #[arrrg(optional, "Service base URL (default: http://localhost:5000/api/)", "URL")]
    pub base_url: Option<String>,

    /// YAML configuration file.
    #[arrrg(optional, "Read settings from a YAML file", "FILE")]
    pub config: Option<String>,

    /// File used to keep credentials between runs.
    #[arrrg(optional, "Persist credentials in FILE (default: memory only)", "FILE")]
    pub credentials: Option<String>,

    /// Disable knowledge-base retrieval.
    #[arrrg(flag, "Answer without searching the knowledge base")]
    pub no_rag: bool,

    /// Disable ANSI colors and styles.
    #[arrrg(flag, "Disable ANSI colors/styles")]
    pub no_color: bool,

    /// Overall request timeout.
    #[arrrg(optional, "Request timeout in seconds (default: none)", "SECS")]
    pub timeout_secs: Option<u64>,

    /// Transcript auto-save path.
    #[arrrg(optional, "Auto-save the transcript to FILE after each turn", "FILE")]
    pub transcript: Option<String>,
}

/// The YAML configuration file. Every field is optional.
#[derive(Debug, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    base_url: Option<String>,
    use_rag: Option<bool>,
    use_color: Option<bool>,
    timeout_secs: Option<u64>,
    credentials_path: Option<PathBuf>,
    transcript_path: Option<PathBuf>,
}

/// Configuration for a chat session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatConfig {
    /// Root URL every endpoint is resolved against.
    pub base_url: String,

    /// Whether turns ask the service to search the knowledge base first.
    pub use_rag: bool,

    /// Whether to use ANSI colors and styles in output.
    pub use_color: bool,

    /// Overall request timeout; `None` leaves it to the HTTP client.
    pub timeout: Option<Duration>,

    /// Where credentials persist between runs; `None` keeps them in memory.
    pub credentials_path: Option<PathBuf>,

    /// Path to persist transcripts automatically after each assistant turn.
    pub transcript_path: Option<PathBuf>,
}

impl ChatConfig {
    /// Creates a new ChatConfig with default values.
    ///
    /// Defaults:
    /// - Base URL: http://localhost:5000/api/
    /// - Retrieval: enabled
    /// - Color: enabled
    /// - Timeout, credentials file, transcript: none
    pub fn new() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            use_rag: true,
            use_color: true,
            timeout: None,
            credentials_path: None,
            transcript_path: None,
        }
    }

    /// Loads defaults overlaid with the settings in a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new().merge(ConfigFile::load(path.as_ref())?))
    }

    /// Resolves the full configuration for a command line.
    pub fn from_args(args: ChatArgs) -> Result<Self> {
        Self::resolve(args, env::var(BASE_URL_ENV).ok())
    }

    fn resolve(args: ChatArgs, env_base_url: Option<String>) -> Result<Self> {
        let file = match &args.config {
            Some(path) => ConfigFile::load(Path::new(path))?,
            None => ConfigFile::default(),
        };
        let mut config = Self::new();
        if let Some(base_url) = env_base_url {
            config.base_url = base_url;
        }
        let config = config.merge(file).apply(args);
        transport::base_url(&config.base_url)?;
        Ok(config)
    }

    fn merge(mut self, file: ConfigFile) -> Self {
        if let Some(base_url) = file.base_url {
            self.base_url = base_url;
        }
        if let Some(use_rag) = file.use_rag {
            self.use_rag = use_rag;
        }
        if let Some(use_color) = file.use_color {
            self.use_color = use_color;
        }
        if let Some(secs) = file.timeout_secs {
            self.timeout = Some(Duration::from_secs(secs));
        }
        if file.credentials_path.is_some() {
            self.credentials_path = file.credentials_path;
        }
        if file.transcript_path.is_some() {
            self.transcript_path = file.transcript_path;
        }
        self
    }

    fn apply(mut self, args: ChatArgs) -> Self {
        if let Some(base_url) = args.base_url {
            self.base_url = base_url;
        }
        if args.no_rag {
            self.use_rag = false;
        }
        if args.no_color {
            self.use_color = false;
        }
        if let Some(secs) = args.timeout_secs {
            self.timeout = Some(Duration::from_secs(secs));
        }
        if let Some(path) = args.credentials {
            self.credentials_path = Some(PathBuf::from(path));
        }
        if let Some(path) = args.transcript {
            self.transcript_path = Some(PathBuf::from(path));
        }
        self
    }

    /// Sets the base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Sets whether retrieval is requested.
    pub fn with_rag(mut self, use_rag: bool) -> Self {
        self.use_rag = use_rag;
        self
    }

    /// Disables ANSI color output.
    pub fn without_color(mut self) -> Self {
        self.use_color = false;
        self
    }

    /// Sets the request timeout.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the credentials file.
    pub fn with_credentials_path(mut self, path: Option<PathBuf>) -> Self {
        self.credentials_path = path;
        self
    }

    /// Sets the transcript auto-save path.
    pub fn with_transcript_path(mut self, path: Option<PathBuf>) -> Self {
        self.transcript_path = path;
        self
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigFile {
    fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|err| {
            Error::io(format!("failed to read config {}", path.display()), err)
        })?;
        Ok(serde_yaml::from_str(&contents)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(test: &str, contents: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("kbchat-config-{test}-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("kbchat.yaml");
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn default_config() {
        let config = ChatConfig::new();
        assert_eq!(config.base_url, "http://localhost:5000/api/");
        assert!(config.use_rag);
        assert!(config.use_color);
        assert!(config.timeout.is_none());
        assert!(config.credentials_path.is_none());
        assert!(config.transcript_path.is_none());
    }

    #[test]
    fn config_from_args_defaults() {
        let config = ChatConfig::resolve(ChatArgs::default(), None).unwrap();
        assert_eq!(config, ChatConfig::new());
    }

    #[test]
    fn config_from_args_custom() {
        let args = ChatArgs {
            base_url: Some("http://kb.internal/api".to_string()),
            no_rag: true,
            no_color: true,
            timeout_secs: Some(30),
            credentials: Some("creds.json".to_string()),
            transcript: Some("chat.json".to_string()),
            ..ChatArgs::default()
        };
        let config = ChatConfig::resolve(args, Some("http://ignored/".to_string())).unwrap();
        assert_eq!(config.base_url, "http://kb.internal/api");
        assert!(!config.use_rag);
        assert!(!config.use_color);
        assert_eq!(config.timeout, Some(Duration::from_secs(30)));
        assert_eq!(config.credentials_path, Some(PathBuf::from("creds.json")));
        assert_eq!(config.transcript_path, Some(PathBuf::from("chat.json")));
    }

    #[test]
    fn environment_fills_in_base_url() {
        let config =
            ChatConfig::resolve(ChatArgs::default(), Some("http://env.host/api/".to_string()))
                .unwrap();
        assert_eq!(config.base_url, "http://env.host/api/");
    }

    #[test]
    fn file_sits_between_environment_and_flags() {
        let path = write_config(
            "layers",
            "base_url: http://file.host/api/\nuse_rag: false\ntimeout_secs: 5\n",
        );
        let args = ChatArgs {
            config: Some(path.display().to_string()),
            timeout_secs: Some(9),
            ..ChatArgs::default()
        };
        let config = ChatConfig::resolve(args, Some("http://env.host/".to_string())).unwrap();
        assert_eq!(config.base_url, "http://file.host/api/");
        assert!(!config.use_rag);
        assert_eq!(config.timeout, Some(Duration::from_secs(9)));

        let loaded = ChatConfig::from_file(&path).unwrap();
        assert_eq!(loaded.timeout, Some(Duration::from_secs(5)));
        let _ = fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn bad_inputs_are_errors() {
        let path = write_config("unknown", "model: claude\n");
        assert!(matches!(
            ChatConfig::from_file(&path),
            Err(Error::Serialization { .. })
        ));
        let _ = fs::remove_dir_all(path.parent().unwrap());

        assert!(matches!(
            ChatConfig::from_file("/nonexistent/kbchat.yaml"),
            Err(Error::Io { .. })
        ));

        let args = ChatArgs {
            base_url: Some("not a url".to_string()),
            ..ChatArgs::default()
        };
        assert!(ChatConfig::resolve(args, None).is_err());
    }

    #[test]
    fn config_builder_pattern() {
        let config = ChatConfig::new()
            .with_base_url("http://kb.internal/api/")
            .with_rag(false)
            .without_color()
            .with_timeout(Some(Duration::from_secs(3)))
            .with_credentials_path(Some(PathBuf::from("creds.json")))
            .with_transcript_path(Some(PathBuf::from("transcript.json")));

        assert_eq!(config.base_url, "http://kb.internal/api/");
        assert!(!config.use_rag);
        assert!(!config.use_color);
        assert_eq!(config.timeout, Some(Duration::from_secs(3)));
        assert_eq!(config.credentials_path, Some(PathBuf::from("creds.json")));
        assert_eq!(
            config.transcript_path,
            Some(PathBuf::from("transcript.json"))
        );
    }
}
