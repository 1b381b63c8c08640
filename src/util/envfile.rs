use anyhow::Result;
use std::fs;
use std::io::Write;
use std::path::Path;

/// Parse environment variables from a .env file in the current working
/// directory, if present. Does not modify the process environment.
pub fn parse_env_file() -> Result<std::collections::HashMap<String, String>> {
    parse_env_file_at(Path::new(".env"))
}

fn parse_env_file_at(path: &Path) -> Result<std::collections::HashMap<String, String>> {
    let mut map = std::collections::HashMap::new();
    if !path.exists() {
        return Ok(map);
    }
    let content = fs::read_to_string(path)?;
    for (idx, line) in content.lines().enumerate() {
        let s = line.trim();
        if s.is_empty() || s.starts_with('#') {
            continue;
        }
        if let Some(eq) = s.find('=') {
            let key = s[..eq].trim();
            let mut val = s[eq + 1..].to_string();
            // Remove surrounding quotes if present
            if (val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\''))
            {
                val = val[1..val.len() - 1].to_string();
            }
            map.insert(key.to_string(), val);
        } else {
            eprintln!(
                "Warning: ignoring .env line {} without '=': {}",
                idx + 1,
                line
            );
        }
    }
    Ok(map)
}

/// Load `.env` from the current working directory into the process
/// environment. Non-destructive: existing variables are not overridden.
pub fn load_dotenv_if_present() -> Result<()> {
    if let Ok(map) = parse_env_file() {
        for (k, v) in map {
            if std::env::var_os(&k).is_none() {
                std::env::set_var(&k, &v);
            }
        }
    }
    Ok(())
}

/// Generate a .env.template file with placeholder values and comments.
pub fn write_env_template(path: &str) -> Result<()> {
    let mut f = fs::File::create(path)?;
    let template = r#"# Inventory Standardizer environment configuration template
# Copy this file to .env and fill in your catalog database settings.
# Any of these variables can also be provided via the system environment.
# When the DB_* variables are absent the tool runs in local-memory mode:
# matching still works against the seeded starter catalog, but review
# decisions are not persisted.

# Catalog database
DB_HOST=127.0.0.1
DB_PORT=3306
DB_USER=root
DB_PASSWORD=secret
DB_NAME=inventory_catalog

# Admin gate for catalog-editing commands (soft gate, not a security boundary)
#ADMIN_GATE_SECRET=TINCTester

# Connection pool (optional)
#INV_STANDARDIZER_POOL_SIZE=8
#INV_STANDARDIZER_ACQUIRE_MS=30000
"#;
    f.write_all(template.as_bytes())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_quotes_comments_and_blank_lines() {
        let dir = std::env::temp_dir().join(format!("envfile-test-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(".env");
        fs::write(
            &path,
            "# comment\n\nDB_HOST=localhost\nDB_PASSWORD=\"hunter2\"\nDB_NAME='catalog'\nBROKEN LINE\n",
        )
        .unwrap();

        let map = parse_env_file_at(&path).unwrap();
        assert_eq!(map.get("DB_HOST").map(String::as_str), Some("localhost"));
        assert_eq!(map.get("DB_PASSWORD").map(String::as_str), Some("hunter2"));
        assert_eq!(map.get("DB_NAME").map(String::as_str), Some("catalog"));
        assert!(!map.contains_key("BROKEN LINE"));

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn missing_file_yields_empty_map() {
        let map = parse_env_file_at(Path::new("/nonexistent/.env")).unwrap();
        assert!(map.is_empty());
    }
}
