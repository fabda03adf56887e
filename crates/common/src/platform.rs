use std::path::PathBuf;
use tracing::debug;

/// Application identifiers used to derive per-user directories.
const QUALIFIER: &str = "com";
const ORGANIZATION: &str = "examconsole";
const APPLICATION: &str = "exam-console";

/// File name of the persisted credential document.
pub const CREDENTIALS_FILE_NAME: &str = "credentials.json";

/// File name of the configuration file.
pub const CONFIG_FILE_NAME: &str = "config.toml";

fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from(QUALIFIER, ORGANIZATION, APPLICATION)
}

/// Gets the default configuration file path for the console.
/// - Linux: ~/.config/exam-console/config.toml
/// - macOS: ~/Library/Application Support/com.examconsole.exam-console/config.toml
/// - Windows: %APPDATA%\examconsole\exam-console\config\config.toml
pub fn get_config_path() -> Option<PathBuf> {
    let path = project_dirs()?.config_dir().join(CONFIG_FILE_NAME);
    debug!("Resolved config path: {:?}", path);
    Some(path)
}

/// Gets the default location of the persisted credentials.
///
/// Lives in the data directory rather than the config directory so that
/// wiping configuration does not sign the user out.
pub fn get_credentials_path() -> Option<PathBuf> {
    let path = project_dirs()?.data_dir().join(CREDENTIALS_FILE_NAME);
    debug!("Resolved credentials path: {:?}", path);
    Some(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_use_expected_file_names() {
        // Headless CI may lack a home directory, in which case both are None.
        if let Some(path) = get_config_path() {
            assert!(path.ends_with(CONFIG_FILE_NAME));
        }
        if let Some(path) = get_credentials_path() {
            assert!(path.ends_with(CREDENTIALS_FILE_NAME));
        }
    }
}
