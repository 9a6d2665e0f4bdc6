//! Integration tests for the spriteforge CLI
//!
//! These tests drive the binary against temporary project directories.

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use image::{ImageFormat, Rgba, RgbaImage};
use predicates::prelude::*;
use std::fs;
use std::io::Cursor;
use std::path::Path;
use tempfile::TempDir;

const MAGENTA: Rgba<u8> = Rgba([255, 0, 255, 255]);
const GREEN: Rgba<u8> = Rgba([20, 200, 40, 255]);

/// Helper to create a spriteforge Command
fn spriteforge() -> Command {
    let mut cmd = cargo_bin_cmd!("spriteforge");
    cmd.env_remove("SPRITEFORGE_SYNTH_CMD")
        .env_remove("SPRITEFORGE_MODEL")
        .env_remove("RUST_LOG");
    cmd
}

/// Helper to create a temporary project directory
fn create_temp_project() -> TempDir {
    TempDir::new().unwrap()
}

/// Helper to initialize a project in a temp directory
fn init_project(dir: &TempDir) {
    spriteforge()
        .current_dir(dir.path())
        .arg("init")
        .assert()
        .success();
}

/// A 16x16 sprite: magenta background with a green 8x8 body.
fn sprite_png() -> Vec<u8> {
    let img = RgbaImage::from_fn(16, 16, |x, y| {
        if (4..12).contains(&x) && (4..12).contains(&y) {
            GREEN
        } else {
            MAGENTA
        }
    });
    let mut out = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgba8(img)
        .write_to(&mut out, ImageFormat::Png)
        .unwrap();
    out.into_inner()
}

fn write_sprite(dir: &Path, name: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    fs::write(&path, sprite_png()).unwrap();
    path
}

// =============================================================================
// Basic CLI Tests
// =============================================================================

mod cli_basics {
    use super::*;

    #[test]
    fn test_help() {
        spriteforge().arg("--help").assert().success();
    }

    #[test]
    fn test_version() {
        spriteforge().arg("--version").assert().success();
    }

    #[test]
    fn test_init_creates_structure() {
        let dir = create_temp_project();

        spriteforge()
            .current_dir(dir.path())
            .arg("init")
            .assert()
            .success()
            .stdout(predicate::str::contains("Initialized spriteforge project"));

        assert!(dir.path().join(".spriteforge").is_dir());
        assert!(dir.path().join(".spriteforge/refs").is_dir());
        assert!(dir.path().join(".spriteforge/logs").is_dir());
        assert!(dir.path().join(".spriteforge/forge.toml").is_file());
    }

    #[test]
    fn test_init_idempotent() {
        let dir = create_temp_project();
        init_project(&dir);

        spriteforge()
            .current_dir(dir.path())
            .arg("init")
            .assert()
            .success()
            .stdout(predicate::str::contains("already initialized"));
    }

    #[test]
    fn test_status_uninitialized_fails() {
        let dir = create_temp_project();

        spriteforge()
            .current_dir(dir.path())
            .arg("status")
            .assert()
            .failure()
            .stderr(predicate::str::contains("spriteforge init"));
    }

    #[test]
    fn test_status_starts_in_intake() {
        let dir = create_temp_project();
        init_project(&dir);

        spriteforge()
            .current_dir(dir.path())
            .arg("status")
            .assert()
            .success()
            .stdout(predicate::str::contains("INTAKE"))
            .stdout(predicate::str::contains("spriteforge upload"));
    }

    #[test]
    fn test_tree_empty_vault() {
        let dir = create_temp_project();
        init_project(&dir);

        spriteforge()
            .current_dir(dir.path())
            .arg("tree")
            .assert()
            .success()
            .stdout(predicate::str::contains("The vault is empty"));
    }
}

// =============================================================================
// Phase Gating Tests
// =============================================================================

mod phase_gating {
    use super::*;

    #[test]
    fn test_extract_before_upload_is_rejected() {
        let dir = create_temp_project();
        init_project(&dir);

        spriteforge()
            .current_dir(dir.path())
            .arg("extract")
            .assert()
            .failure()
            .stderr(predicate::str::contains("'extract' is not allowed in phase INTAKE"));
    }

    #[test]
    fn test_rejection_is_recorded_and_clearable() {
        let dir = create_temp_project();
        init_project(&dir);

        spriteforge()
            .current_dir(dir.path())
            .args(["gear", "leather vest"])
            .assert()
            .failure();

        spriteforge()
            .current_dir(dir.path())
            .arg("status")
            .assert()
            .success()
            .stdout(predicate::str::contains("Last error"));

        spriteforge()
            .current_dir(dir.path())
            .args(["status", "--clear-error"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Last error").not());
    }

    #[test]
    fn test_upload_moves_to_extraction() {
        let dir = create_temp_project();
        init_project(&dir);
        let image = write_sprite(dir.path(), "hero.png");

        spriteforge()
            .current_dir(dir.path())
            .arg("upload")
            .arg(&image)
            .assert()
            .success()
            .stdout(predicate::str::contains("EXTRACTION"));

        assert!(dir.path().join(".spriteforge/refs/raw_upload.png").is_file());

        spriteforge()
            .current_dir(dir.path())
            .arg("upload")
            .arg(&image)
            .assert()
            .failure()
            .stderr(predicate::str::contains("not allowed in phase EXTRACTION"));
    }

    #[test]
    fn test_upload_rejects_non_image() {
        let dir = create_temp_project();
        init_project(&dir);
        fs::write(dir.path().join("notes.txt"), "hello").unwrap();

        spriteforge()
            .current_dir(dir.path())
            .args(["upload", "notes.txt"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("does not look like an image"));
    }

    #[test]
    fn test_refine_in_extraction_is_rejected() {
        let dir = create_temp_project();
        init_project(&dir);
        let image = write_sprite(dir.path(), "hero.png");
        spriteforge()
            .current_dir(dir.path())
            .arg("upload")
            .arg(&image)
            .assert()
            .success();

        spriteforge()
            .current_dir(dir.path())
            .args(["refine", "red hair"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("'refine' is not allowed in phase EXTRACTION"));
    }

    #[test]
    fn test_reset_returns_to_intake() {
        let dir = create_temp_project();
        init_project(&dir);
        let image = write_sprite(dir.path(), "hero.png");
        spriteforge()
            .current_dir(dir.path())
            .arg("upload")
            .arg(&image)
            .assert()
            .success();

        spriteforge()
            .current_dir(dir.path())
            .args(["reset", "--force"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Reset complete"));

        spriteforge()
            .current_dir(dir.path())
            .arg("status")
            .assert()
            .success()
            .stdout(predicate::str::contains("INTAKE"));
        assert!(!dir.path().join(".spriteforge/refs/raw_upload.png").exists());
    }

    #[test]
    fn test_select_unknown_asset() {
        let dir = create_temp_project();
        init_project(&dir);

        spriteforge()
            .current_dir(dir.path())
            .args(["select", "deadbeef"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("No asset matches"));
    }

    #[test]
    fn test_session_writers_wait_for_project_lock() {
        use fs2::FileExt;

        let dir = create_temp_project();
        init_project(&dir);
        let image = write_sprite(dir.path(), "hero.png");

        // Another process holds the lock mid-generation
        let held = fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(dir.path().join(".spriteforge/generate.lock"))
            .unwrap();
        held.lock_exclusive().unwrap();

        spriteforge()
            .current_dir(dir.path())
            .arg("upload")
            .arg(&image)
            .assert()
            .failure()
            .stderr(predicate::str::contains("already working in this project"));
        spriteforge()
            .current_dir(dir.path())
            .args(["reset", "--force"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("already working in this project"));
        spriteforge()
            .current_dir(dir.path())
            .args(["status", "--clear-error"])
            .assert()
            .failure();

        // Read-only commands still work
        spriteforge()
            .current_dir(dir.path())
            .arg("status")
            .assert()
            .success()
            .stdout(predicate::str::contains("INTAKE"));
        assert!(!dir.path().join(".spriteforge/session.json").exists());

        FileExt::unlock(&held).unwrap();
        spriteforge()
            .current_dir(dir.path())
            .arg("upload")
            .arg(&image)
            .assert()
            .success();
    }
}

// =============================================================================
// Export Tests
// =============================================================================

mod export {
    use super::*;

    #[test]
    fn test_export_without_reference_fails() {
        let dir = create_temp_project();
        init_project(&dir);

        spriteforge()
            .current_dir(dir.path())
            .arg("export")
            .assert()
            .failure()
            .stderr(predicate::str::contains("Nothing to export"));
    }

    #[test]
    fn test_export_after_upload_is_still_nothing() {
        let dir = create_temp_project();
        init_project(&dir);
        let image = write_sprite(dir.path(), "hero.png");
        spriteforge()
            .current_dir(dir.path())
            .arg("upload")
            .arg(&image)
            .assert()
            .success();

        // The raw upload is not an exportable reference
        spriteforge()
            .current_dir(dir.path())
            .arg("export")
            .assert()
            .failure()
            .stderr(predicate::str::contains("Nothing to export"));
    }

    #[test]
    fn test_key_removes_background() {
        let dir = create_temp_project();
        let input = write_sprite(dir.path(), "in.png");
        let output = dir.path().join("out.png");

        spriteforge()
            .current_dir(dir.path())
            .arg("key")
            .arg(&input)
            .arg(&output)
            .assert()
            .success()
            .stdout(predicate::str::contains("threshold 45"));

        let keyed = image::open(&output).unwrap().to_rgba8();
        assert_eq!(keyed.get_pixel(0, 0).0[3], 0);
        assert_eq!(keyed.get_pixel(8, 8).0[3], 255);
        assert_eq!(keyed.get_pixel(8, 8).0[..3], GREEN.0[..3]);
    }

    #[test]
    fn test_key_rejects_negative_threshold() {
        let dir = create_temp_project();
        let input = write_sprite(dir.path(), "in.png");

        spriteforge()
            .current_dir(dir.path())
            .arg("key")
            .arg(&input)
            .arg(dir.path().join("out.png"))
            .args(["--threshold=-1"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("threshold"));
    }
}

// =============================================================================
// Configuration Tests
// =============================================================================

mod configuration {
    use super::*;

    #[test]
    fn test_config_show_defaults() {
        let dir = create_temp_project();
        init_project(&dir);

        spriteforge()
            .current_dir(dir.path())
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("gemini-2.5-flash-image"))
            .stdout(predicate::str::contains("threshold = 45"));
    }

    #[test]
    fn test_config_env_override() {
        let dir = create_temp_project();
        init_project(&dir);

        spriteforge()
            .current_dir(dir.path())
            .env("SPRITEFORGE_MODEL", "gemini-3-pro-image-preview")
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains(
                "model = \"gemini-3-pro-image-preview\"",
            ));
    }

    #[test]
    fn test_config_validate_reports_warnings() {
        let dir = create_temp_project();
        init_project(&dir);
        fs::write(
            dir.path().join(".spriteforge/forge.toml"),
            "[chroma]\nthreshold = -3.0\n",
        )
        .unwrap();

        spriteforge()
            .current_dir(dir.path())
            .args(["config", "validate"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Configuration warnings"))
            .stdout(predicate::str::contains("[chroma]"));
    }

    #[test]
    fn test_config_init_does_not_overwrite() {
        let dir = create_temp_project();
        init_project(&dir);

        spriteforge()
            .current_dir(dir.path())
            .args(["config", "init"])
            .assert()
            .success()
            .stdout(predicate::str::contains("already exists"));
    }

    #[test]
    fn test_chain_list_and_toggle() {
        let dir = create_temp_project();
        init_project(&dir);

        spriteforge()
            .current_dir(dir.path())
            .args(["chain", "list"])
            .assert()
            .success()
            .stdout(predicate::str::contains("engine-core"))
            .stdout(predicate::str::contains("[locked]"));

        spriteforge()
            .current_dir(dir.path())
            .args(["chain", "disable", "chroma-key"])
            .assert()
            .success()
            .stdout(predicate::str::contains("disabled"));

        let toml = fs::read_to_string(dir.path().join(".spriteforge/forge.toml")).unwrap();
        assert!(toml.contains("active = false"));

        spriteforge()
            .current_dir(dir.path())
            .args(["chain", "disable", "engine-core"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("locked"));

        spriteforge()
            .current_dir(dir.path())
            .args(["chain", "enable", "nope"])
            .assert()
            .failure();
    }
}

// =============================================================================
// Full Workflow (shell-backed synthesizer)
// =============================================================================

#[cfg(unix)]
mod workflow {
    use super::*;
    use base64::Engine;

    /// Project whose synthesizer echoes a fixed sprite for every request.
    fn project_with_echo_synth() -> TempDir {
        let dir = create_temp_project();
        init_project(&dir);
        let data = base64::engine::general_purpose::STANDARD.encode(sprite_png());
        fs::write(
            dir.path().join("response.json"),
            format!(r#"{{"mime_type":"image/png","data":"{}"}}"#, data),
        )
        .unwrap();
        fs::write(
            dir.path().join(".spriteforge/forge.toml"),
            "[project]\nsynth_cmd = \"sh\"\nsynth_args = [\"-c\", \"cat > /dev/null; cat response.json\"]\n",
        )
        .unwrap();
        dir
    }

    fn short_id_from(stdout: &[u8]) -> String {
        let text = String::from_utf8_lossy(stdout);
        let start = text.find("saved as ").unwrap() + "saved as ".len();
        text[start..start + 8].to_string()
    }

    #[test]
    fn test_full_forge_flow() {
        let dir = project_with_echo_synth();
        let image = write_sprite(dir.path(), "hero.png");
        let run = |args: &[&str]| {
            spriteforge()
                .current_dir(dir.path())
                .args(args)
                .assert()
                .success()
        };

        spriteforge()
            .current_dir(dir.path())
            .arg("upload")
            .arg(&image)
            .assert()
            .success();
        run(&["extract"]).stdout(predicate::str::contains("IDENTITY"));
        run(&["refine", "red hair, scar"]).stdout(predicate::str::contains("GEAR"));

        let first = run(&["gear", "leather vest"]).stdout(predicate::str::contains("Step 1"));
        let first_id = short_id_from(&first.get_output().stdout);
        run(&["gear", "iron pauldrons"]).stdout(predicate::str::contains("Step 2"));

        run(&["tree"])
            .stdout(predicate::str::contains("Step 1"))
            .stdout(predicate::str::contains("Step 2"))
            .stdout(predicate::str::contains("leather vest"))
            .stdout(predicate::str::contains("iron pauldrons"));

        // Branch from the first asset
        run(&["select", &first_id]).stdout(predicate::str::contains("leather vest"));
        run(&["gear", "red cape"]).stdout(predicate::str::contains("Step 2"));

        run(&["drift", &first_id]).stdout(predicate::str::contains("0.00%"));

        run(&["export", "--transparent"]).stdout(predicate::str::contains("background removed"));
        let exported: Vec<_> = fs::read_dir(dir.path().join("exports"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(exported.len(), 1);
        assert!(exported[0].starts_with("spriteforge-GEAR-"));
        assert!(exported[0].ends_with(".png"));
    }

    #[test]
    fn test_synthesis_failure_keeps_phase() {
        let dir = project_with_echo_synth();
        fs::write(dir.path().join("response.json"), r#"{"error":"quota exceeded"}"#).unwrap();
        let image = write_sprite(dir.path(), "hero.png");
        spriteforge()
            .current_dir(dir.path())
            .arg("upload")
            .arg(&image)
            .assert()
            .success();

        spriteforge()
            .current_dir(dir.path())
            .arg("extract")
            .assert()
            .failure()
            .stderr(predicate::str::contains("quota exceeded"));

        spriteforge()
            .current_dir(dir.path())
            .arg("status")
            .assert()
            .success()
            .stdout(predicate::str::contains("EXTRACTION"))
            .stdout(predicate::str::contains("quota exceeded"));
    }

    #[test]
    fn test_delete_asset_leaves_children() {
        let dir = project_with_echo_synth();
        let image = write_sprite(dir.path(), "hero.png");
        let run = |args: &[&str]| {
            spriteforge()
                .current_dir(dir.path())
                .args(args)
                .assert()
                .success()
        };
        spriteforge()
            .current_dir(dir.path())
            .arg("upload")
            .arg(&image)
            .assert()
            .success();
        run(&["extract"]);
        run(&["refine", "red hair"]);
        let first = run(&["gear", "leather vest"]);
        let first_id = short_id_from(&first.get_output().stdout);
        run(&["gear", "iron pauldrons"]);

        run(&["delete", &first_id, "--force"]).stdout(predicate::str::contains("Deleted"));
        run(&["tree"])
            .stdout(predicate::str::contains("leather vest").not())
            .stdout(predicate::str::contains("(deleted)"));
    }
}
