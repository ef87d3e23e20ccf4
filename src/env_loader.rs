use std::env;
use std::path::PathBuf;

fn fallback_dotenv_path(vault_home: Option<PathBuf>, home_dir: Option<PathBuf>) -> Option<PathBuf> {
    if let Some(vault_home) = vault_home {
        return Some(vault_home.join(".env"));
    }
    Some(home_dir?.join(".chatvault/.env"))
}

/// Load `./.env`, else the one in the vault home. Existing variables win.
pub fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    let fallback = fallback_dotenv_path(
        env::var_os("CHATVAULT_HOME").map(PathBuf::from),
        dirs::home_dir(),
    );

    let Some(path) = fallback else {
        return;
    };
    if path.is_file() {
        let _ = dotenvy::from_path(&path);
    }
}

#[cfg(test)]
mod tests {
    use super::fallback_dotenv_path;
    use std::path::PathBuf;

    #[test]
    fn vault_home_takes_precedence() {
        let got = fallback_dotenv_path(
            Some(PathBuf::from("/srv/vault")),
            Some(PathBuf::from("/home/alice")),
        );
        assert_eq!(got, Some(PathBuf::from("/srv/vault/.env")));
    }

    #[test]
    fn home_default_is_dot_chatvault() {
        let got = fallback_dotenv_path(None, Some(PathBuf::from("/home/alice")));
        assert_eq!(got, Some(PathBuf::from("/home/alice/.chatvault/.env")));
        assert_eq!(fallback_dotenv_path(None, None), None);
    }
}
