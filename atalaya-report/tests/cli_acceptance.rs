use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

struct CliTestEnv {
    _temp_dir: TempDir,
    home: PathBuf,
    xdg_config: PathBuf,
    xdg_state: PathBuf,
    snapshot: PathBuf,
}

impl CliTestEnv {
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let base = temp_dir.path().to_path_buf();
        let home = base.join("home");
        let xdg_config = base.join("xdg-config");
        let xdg_state = base.join("xdg-state");
        let snapshot = base.join("snapshot");

        fs::create_dir_all(&home).expect("failed to create HOME");
        fs::create_dir_all(&xdg_config).expect("failed to create XDG_CONFIG_HOME");
        fs::create_dir_all(&xdg_state).expect("failed to create XDG_STATE_HOME");
        fs::create_dir_all(&snapshot).expect("failed to create snapshot dir");

        seed_snapshot_fixture(&snapshot);

        Self {
            _temp_dir: temp_dir,
            home,
            xdg_config,
            xdg_state,
            snapshot,
        }
    }

    fn snapshot_arg(&self) -> &str {
        self.snapshot.to_str().expect("snapshot path is not utf-8")
    }

    fn write_config(&self, content: &str) {
        let dir = self.xdg_config.join("atalaya");
        fs::create_dir_all(&dir).expect("failed to create config dir");
        fs::write(dir.join("config.toml"), content).expect("failed to write config");
    }
}

/// Two companies, one connection without a duration, one finished-and-back
/// user: enough activity for every report section to say something.
fn seed_snapshot_fixture(dir: &Path) {
    let collections = [
        (
            "companies.json",
            r#"[{"_id": "c1", "name": "Acme"}, {"_id": "c2", "name": "Globex"}]"#,
        ),
        (
            "groups.json",
            r#"[{"_id": "g1", "name": "Equipo A", "company": "c1"},
                {"_id": "g2", "name": "Equipo B", "company": "c2"}]"#,
        ),
        (
            "users.json",
            r#"[{"_id": "u1", "email": "ana@acme.es", "firstName": "Ana",
                 "lastName": "García", "group": "g1", "company": "c1",
                 "hasUnlockedCoach": true},
                {"_id": "u2", "email": "luis@globex.es", "firstName": "Luis",
                 "lastName": "Pérez", "group": "g2", "company": "c2"}]"#,
        ),
        (
            "connections.json",
            r#"[{"_id": "k1", "user": "u1", "startDate": "2025-03-03T09:00:00Z",
                 "endDate": "2025-03-03T09:20:00Z", "connectionDuration": 20.0},
                {"_id": "k2", "user": "u2", "startDate": "2025-03-04T10:00:00Z",
                 "endDate": "2025-03-04T10:40:00Z", "connectionDuration": 40.0},
                {"_id": "k3", "user": "u1", "startDate": "2025-03-09T18:00:00Z",
                 "endDate": "2025-03-09T18:30:00Z", "connectionDuration": 30.0}]"#,
        ),
        (
            "progress.json",
            r#"[{"_id": "p1", "user": "u1", "type": "progress_checkpoint",
                 "completed": true, "completionDate": "2025-01-05T00:00:00Z"},
                {"_id": "p2", "user": "u1", "type": "progress_checkpoint",
                 "completed": true, "completionDate": "2025-02-01T00:00:00Z"},
                {"_id": "p3", "user": "u1", "type": "progress_exercise",
                 "completed": true, "exercise": "ex1"}]"#,
        ),
        ("modules.json", r#"[{"_id": "m1", "namedId": "modulo-1"}]"#),
        (
            "episodes.json",
            r#"[{"_id": "ep1", "namedId": "episodio-1", "startDate": "2025-01-01T00:00:00Z"}]"#,
        ),
        (
            "exercises.json",
            r#"[{"_id": "ex1", "namedId": "mapa-relaciones",
                 "modules": ["m1"], "episodes": ["ep1"]}]"#,
        ),
        (
            "threads.json",
            r#"[{"_id": "t1", "user": "u1", "assistantMessagesAmount": 1,
                 "userMessagesAmount": 1,
                 "messages": [
                     {"role": "assistant", "content": "¿Cómo vas con el reto?",
                      "date": "2025-03-01T10:00:00Z"},
                     {"role": "user", "content": "Avanzando poco a poco",
                      "date": "2025-03-01T11:00:00Z"}]}]"#,
        ),
    ];

    for (name, content) in collections {
        fs::write(dir.join(name), content).expect("failed to write fixture collection");
    }
}

fn run_report(env: &CliTestEnv, args: &[&str]) -> Output {
    let bin_path = PathBuf::from(assert_cmd::cargo::cargo_bin!("atalaya-report"));

    let mut command = Command::new(bin_path);
    command
        .args(args)
        .env("HOME", &env.home)
        .env("XDG_CONFIG_HOME", &env.xdg_config)
        .env("XDG_STATE_HOME", &env.xdg_state)
        .env_remove("ATALAYA_CONFIG")
        .env_remove("RUST_LOG")
        .output()
        .unwrap_or_else(|e| panic!("failed to execute atalaya-report: {e}"))
}

fn assert_success(args: &[&str], output: &Output) {
    if output.status.success() {
        return;
    }

    let rendered_args = args
        .iter()
        .map(|arg| OsString::from(arg).to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(" ");
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    panic!(
        "atalaya-report {rendered_args} failed\nstatus: {}\nstdout:\n{}\nstderr:\n{}",
        output.status, stdout, stderr
    );
}

#[test]
fn full_run_renders_every_report_section() {
    let env = CliTestEnv::new();

    let args = ["--snapshot", env.snapshot_arg(), "--verbose"];
    let output = run_report(&env, &args);
    assert_success(&args, &output);

    let stdout = String::from_utf8_lossy(&output.stdout);
    for section in [
        "== Recurrencia ==",
        "== Conexiones ==",
        "== Entrenamientos ==",
        "== Coach ==",
        "== Avance ==",
    ] {
        assert!(stdout.contains(section), "missing {section} in:\n{stdout}");
    }

    // Spot checks across engines: the finished-and-back user, the weekday
    // table, the released exercise and the coach funnel.
    assert!(stdout.contains("SÍ"));
    assert!(stdout.contains("Lunes"));
    assert!(stdout.contains("mapa-relaciones"));
    assert!(stdout.contains("Embudo del coach"));
    assert!(stdout.contains("sheets from"));

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("Fingerprint:"),
        "expected snapshot notes on stderr, got:\n{stderr}"
    );
}

#[test]
fn json_workbook_lands_in_the_output_file() {
    let env = CliTestEnv::new();
    let out_path = env.snapshot.with_file_name("workbook.json");
    let out_arg = out_path.to_str().expect("output path is not utf-8");

    let args = [
        "--snapshot",
        env.snapshot_arg(),
        "--metric",
        "connections",
        "--format",
        "json",
        "--output",
        out_arg,
    ];
    let output = run_report(&env, &args);
    assert_success(&args, &output);
    assert!(output.stdout.is_empty(), "output file runs print nothing");

    let raw = fs::read_to_string(&out_path).expect("failed to read workbook");
    let workbook: serde_json::Value = serde_json::from_str(&raw).expect("workbook is not JSON");

    let sheets = workbook["sheets"].as_array().expect("missing sheets");
    assert_eq!(sheets[0]["name"], "Conexiones");
    assert_eq!(
        sheets[0]["rows"][0],
        serde_json::json!(["Número total de conexiones", "3"])
    );
    assert_eq!(
        sheets[0]["rows"][1],
        serde_json::json!(["Tiempo medio de conexión (minutos)", "30"])
    );
}

#[test]
fn configured_exclusions_apply_to_the_run() {
    let env = CliTestEnv::new();
    env.write_config(
        r#"
[exclusions]
companies = ["Globex"]
"#,
    );

    let args = ["--snapshot", env.snapshot_arg(), "--metric", "connections"];
    let output = run_report(&env, &args);
    assert_success(&args, &output);

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Acme"), "expected Acme in:\n{stdout}");
    assert!(
        !stdout.contains("Globex"),
        "excluded company leaked into:\n{stdout}"
    );
}
