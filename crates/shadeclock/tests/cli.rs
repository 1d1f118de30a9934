use std::fs;
use std::path::Path;
use std::process::{Command, Output};

const CONFIG: &str = r#"
[[shaders]]
name = "vibrance"
start_time = 08:00:00
end_time = 18:00:00

[[shaders]]
name = "blue-light-filter"
start_time = 19:00:00

[[shaders]]
name = "color-filter"
default = true
"#;

fn shadeclock(root: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_shadeclock"))
        .args(args)
        .env("XDG_CONFIG_HOME", root.join("config"))
        .env("XDG_STATE_HOME", root.join("state"))
        .env("SHADECLOCK_SYSTEMD_DIR", root.join("units"))
        .env("SHADECLOCK_HYPRCTL", root.join("missing-hyprctl"))
        .env_remove("SHADECLOCK_CONFIG")
        .env_remove("SHADECLOCK_SHADERS_DIR")
        .env_remove("SHADECLOCK_STATE_DIR")
        .env_remove("RUST_LOG")
        .output()
        .expect("run shadeclock")
}

#[test]
fn install_writes_units_from_the_config() {
    let temp = tempfile::tempdir().unwrap();
    let config = temp.path().join("schedule.toml");
    fs::write(&config, CONFIG).unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_shadeclock"))
        .arg("install")
        .env("SHADECLOCK_CONFIG", &config)
        .env("SHADECLOCK_SYSTEMD_DIR", temp.path().join("units"))
        .env("XDG_STATE_HOME", temp.path().join("state"))
        .output()
        .expect("run shadeclock");
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let timer = fs::read_to_string(temp.path().join("units/shadeclock.timer")).unwrap();
    let calendar: Vec<&str> = timer
        .lines()
        .filter(|line| line.starts_with("OnCalendar="))
        .collect();
    assert_eq!(
        calendar,
        [
            "OnCalendar=*-*-* 08:00:00",
            "OnCalendar=*-*-* 18:00:00",
            "OnCalendar=*-*-* 19:00:00",
        ]
    );
    let service = fs::read_to_string(temp.path().join("units/shadeclock.service")).unwrap();
    assert!(service.contains("auto"));
}

#[test]
fn auto_without_config_fails() {
    let temp = tempfile::tempdir().unwrap();
    let output = shadeclock(temp.path(), &["auto"]);
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.starts_with("Error: could not find a config file"), "{stderr}");
}

#[test]
fn invalid_config_reports_the_location() {
    let temp = tempfile::tempdir().unwrap();
    let config_dir = temp.path().join("config/shadeclock");
    fs::create_dir_all(&config_dir).unwrap();
    fs::write(
        config_dir.join("config.toml"),
        "[[shaders]]\nname = \"a\"\nstart_time = \"noon\"\n",
    )
    .unwrap();

    let output = shadeclock(temp.path(), &["install"]);
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("shaders -> 1 -> start_time"), "{stderr}");
    assert!(stderr.contains("must be time"), "{stderr}");
}

#[test]
fn unknown_shader_lists_searched_dirs() {
    let temp = tempfile::tempdir().unwrap();
    let shader_dir = temp.path().join("config/shadeclock/shaders");
    fs::create_dir_all(&shader_dir).unwrap();

    let output = shadeclock(temp.path(), &["on", "nonexistent"]);
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("could not find shader 'nonexistent'"), "{stderr}");
    assert!(stderr.contains(&shader_dir.display().to_string()), "{stderr}");
}
