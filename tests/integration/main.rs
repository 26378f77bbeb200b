//! Integration tests for nodepack

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    const CATALOG: &str = r#"
language = "nodejs"

[[default_versions]]
name = "node"
version = "4.x"

[[dependencies]]
name = "node"
kind = "runtime"
version = "4.2.0"
uri = "https://buildpacks.example.com/node/node-v4.2.0-linux-x64.tgz"
sha256 = "1111111111111111111111111111111111111111111111111111111111111111"

[[dependencies]]
name = "node"
kind = "runtime"
version = "4.3.1"
uri = "https://buildpacks.example.com/node/node-v4.3.1-linux-x64.tgz"
sha256 = "2222222222222222222222222222222222222222222222222222222222222222"
"#;

    /// Command isolated from the user's config file
    fn nodepack(temp: &Path) -> Command {
        let mut cmd = cargo_bin_cmd!("nodepack");
        cmd.env("NODEPACK_CONFIG", temp.join("config.toml"))
            .env_remove("NODEPACK_CATALOG");
        cmd
    }

    fn with_catalog() -> TempDir {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("manifest.toml"), CATALOG).unwrap();
        temp
    }

    #[test]
    fn help_displays() {
        let temp = TempDir::new().unwrap();
        nodepack(temp.path())
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("Node.js buildpack staging"));
    }

    #[test]
    fn version_displays() {
        let temp = TempDir::new().unwrap();
        nodepack(temp.path())
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("nodepack"));
    }

    #[test]
    fn config_path() {
        let temp = TempDir::new().unwrap();
        nodepack(temp.path())
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("config.toml"));
    }

    #[test]
    fn config_show() {
        let temp = TempDir::new().unwrap();
        nodepack(temp.path())
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[cache]"));
    }

    #[test]
    fn config_set_persists() {
        let temp = TempDir::new().unwrap();
        nodepack(temp.path())
            .args(["config", "set", "cache.air_gapped", "true"])
            .assert()
            .success();
        nodepack(temp.path())
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("air_gapped = true"));
    }

    #[test]
    fn resolve_range_picks_highest() {
        let temp = with_catalog();
        let catalog = temp.path().join("manifest.toml");
        nodepack(temp.path())
            .args(["resolve", "node", "4.x", "--format", "plain", "--catalog"])
            .arg(&catalog)
            .assert()
            .success()
            .stdout("4.3.1\n");
    }

    #[test]
    fn resolve_unknown_version_fails() {
        let temp = with_catalog();
        let catalog = temp.path().join("manifest.toml");
        nodepack(temp.path())
            .args(["resolve", "node", "9000.0.0", "--catalog"])
            .arg(&catalog)
            .assert()
            .failure()
            .stderr(predicate::str::contains("no match found for 9000.0.0"));
    }

    #[test]
    fn stage_air_gapped_cold_cache_fails() {
        let temp = with_catalog();
        let app = temp.path().join("app");
        fs::create_dir_all(&app).unwrap();
        fs::write(app.join("package.json"), r#"{"engines": {"node": "4.x"}}"#).unwrap();

        nodepack(temp.path())
            .arg("stage")
            .arg(&app)
            .arg(temp.path().join("cache"))
            .arg("--air-gapped")
            .arg("--catalog")
            .arg(temp.path().join("manifest.toml"))
            .assert()
            .failure()
            .stdout(predicate::str::contains("Installing node 4.3.1"))
            .stderr(predicate::str::contains("Unable to install node"));
    }

    #[test]
    fn cache_list_empty() {
        let temp = TempDir::new().unwrap();
        nodepack(temp.path())
            .args(["cache", "--artifact-dir"])
            .arg(temp.path().join("artifacts"))
            .arg("list")
            .assert()
            .success()
            .stdout(predicate::str::contains("No cached artifacts"));
    }
}
