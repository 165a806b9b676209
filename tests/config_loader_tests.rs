use alumni::config::{ConfigError, ConfigLoader};
use std::{
    env, fs,
    path::PathBuf,
    sync::{Mutex, MutexGuard, OnceLock},
};
use tempfile::TempDir;

const MANAGED_VARS: &[&str] = &[
    "ALUMNI_PROFILE",
    "ALUMNI_API_BIND_ADDR",
    "ALUMNI_LOG_LEVEL",
    "ALUMNI_TIMELINE_HALF_LIFE_HOURS",
    "ALUMNI_TIMELINE_WINDOW_DAYS",
    "ALUMNI_SECURITY_MAX_FAILED_ATTEMPTS",
    "ALUMNI_WEBHOOK_MAX_ATTEMPTS",
    "ALUMNI_FEDERATION_BASE_URL",
];

fn env_lock() -> &'static Mutex<()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(()))
}

fn env_guard() -> MutexGuard<'static, ()> {
    env_lock()
        .lock()
        .unwrap_or_else(|poison| poison.into_inner())
}

fn clear_env() {
    for name in MANAGED_VARS {
        unsafe {
            env::remove_var(name);
        }
    }
}

fn write_env_file(dir: &TempDir, name: &str, contents: &str) {
    let path = dir.path().join(name);
    fs::write(path, contents).unwrap();
}

fn empty_dir_loader() -> (TempDir, ConfigLoader) {
    let temp_dir = TempDir::new().unwrap();
    let loader = ConfigLoader::with_base_dir(PathBuf::from(temp_dir.path()));
    (temp_dir, loader)
}

#[test]
fn loads_defaults_when_no_env_present() {
    let _guard = env_guard();
    clear_env();

    let (_dir, loader) = empty_dir_loader();
    let cfg = loader.load().expect("config loads with defaults");

    assert_eq!(cfg.profile, "local");
    assert_eq!(cfg.api_bind_addr, "0.0.0.0:8080");
    assert_eq!(cfg.log_level, "info");
    assert_eq!(cfg.timeline.half_life_hours, 24.0);
    assert_eq!(cfg.timeline.window_days, 30);
    assert_eq!(cfg.timeline.max_candidates, 500);
    assert_eq!(cfg.security.max_failed_attempts, 5);
    assert_eq!(cfg.security.window_minutes, 15);
    assert_eq!(cfg.security.block_minutes, 30);
    assert_eq!(cfg.webhooks.max_attempts, 3);
    assert_eq!(cfg.ab_testing.assignment_cache_ttl_seconds, 1800);
    assert!(cfg.is_development());
    cfg.bind_addr().expect("default bind addr parses");
}

#[test]
fn layered_env_files_apply_in_order() {
    let _guard = env_guard();
    clear_env();

    let temp_dir = TempDir::new().unwrap();
    write_env_file(&temp_dir, ".env", "ALUMNI_API_BIND_ADDR=127.0.0.1:3000\n");
    write_env_file(
        &temp_dir,
        ".env.local",
        "ALUMNI_PROFILE=staging\nALUMNI_API_BIND_ADDR=127.0.0.1:4000\nALUMNI_TIMELINE_WINDOW_DAYS=14\n",
    );
    write_env_file(
        &temp_dir,
        ".env.staging",
        "ALUMNI_API_BIND_ADDR=192.168.0.10:5000\nALUMNI_TIMELINE_HALF_LIFE_HOURS=12\n",
    );
    write_env_file(
        &temp_dir,
        ".env.staging.local",
        "ALUMNI_API_BIND_ADDR=10.0.0.5:6000\n",
    );

    let loader = ConfigLoader::with_base_dir(PathBuf::from(temp_dir.path()));
    let cfg = loader.load().expect("config loads with layered env files");

    assert_eq!(cfg.profile, "staging");
    assert_eq!(cfg.api_bind_addr, "10.0.0.5:6000");
    assert_eq!(cfg.timeline.window_days, 14);
    assert_eq!(cfg.timeline.half_life_hours, 12.0);
    assert!(!cfg.is_development());
}

#[test]
fn os_environment_has_highest_precedence() {
    let _guard = env_guard();
    clear_env();

    let temp_dir = TempDir::new().unwrap();
    write_env_file(
        &temp_dir,
        ".env",
        "ALUMNI_API_BIND_ADDR=127.0.0.1:3000\nALUMNI_SECURITY_MAX_FAILED_ATTEMPTS=3\n",
    );

    unsafe {
        env::set_var("ALUMNI_API_BIND_ADDR", "0.0.0.0:9090");
        env::set_var("ALUMNI_SECURITY_MAX_FAILED_ATTEMPTS", "8");
    }

    let loader = ConfigLoader::with_base_dir(PathBuf::from(temp_dir.path()));
    let cfg = loader.load().expect("config loads with env override");
    assert_eq!(cfg.api_bind_addr, "0.0.0.0:9090");
    assert_eq!(cfg.security.max_failed_attempts, 8);

    clear_env();
}

#[test]
fn invalid_bind_addr_returns_error() {
    let _guard = env_guard();
    clear_env();

    unsafe {
        env::set_var("ALUMNI_API_BIND_ADDR", "not-an-addr");
    }
    let (_dir, loader) = empty_dir_loader();
    let err = loader.load().expect_err("invalid bind addr should fail");
    assert!(format!("{}", err).contains("invalid api bind address"));

    clear_env();
}

#[test]
fn non_numeric_settings_are_rejected() {
    let _guard = env_guard();
    clear_env();

    unsafe {
        env::set_var("ALUMNI_WEBHOOK_MAX_ATTEMPTS", "three");
    }
    let (_dir, loader) = empty_dir_loader();
    let err = loader.load().expect_err("non-numeric value should fail");
    assert!(matches!(err, ConfigError::InvalidNumber { .. }));

    clear_env();
}

#[test]
fn out_of_range_settings_are_rejected() {
    let _guard = env_guard();
    clear_env();

    unsafe {
        env::set_var("ALUMNI_TIMELINE_HALF_LIFE_HOURS", "0");
    }
    let (_dir, loader) = empty_dir_loader();
    let err = loader.load().expect_err("zero half-life should fail");
    assert!(matches!(err, ConfigError::InvalidTimelineHalfLife { .. }));

    clear_env();

    unsafe {
        env::set_var("ALUMNI_FEDERATION_BASE_URL", "ftp://alumni.example.edu");
    }
    let (_dir, loader) = empty_dir_loader();
    let err = loader.load().expect_err("non-http federation url should fail");
    assert!(matches!(err, ConfigError::InvalidFederationBaseUrl { .. }));

    clear_env();
}
