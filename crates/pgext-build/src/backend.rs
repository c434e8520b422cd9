//! Native build backends.
//!
//! Each [`Backend`] variant maps to one [`BuildBackend`] strategy that turns
//! a [`BackendContext`] into the ordered commands that compile the source
//! tree and install it under the entry's install directory. The dispatcher
//! only runs the commands and collects what lands in
//! [`BuildBackend::artifact_dir`].

use std::path::{Path, PathBuf};

use pgext_catalog::Backend;

/// Everything a backend needs to know about one build.
#[derive(Debug, Clone)]
pub struct BackendContext {
    pub entry: String,
    /// Checkout root joined with the entry's `subdir`.
    pub build_dir: PathBuf,
    /// Install prefix (or DESTDIR) owned by this entry.
    pub install_dir: PathBuf,
    pub staging_root: PathBuf,
    pub pg_config: String,
    pub jobs: usize,
    pub features: Vec<String>,
    pub disable_default_features: bool,
}

impl BackendContext {
    /// Environment shared by every backend command.
    pub fn env(&self) -> Vec<(String, String)> {
        vec![
            ("PG_CONFIG".to_string(), self.pg_config.clone()),
            ("PGEXT_ENTRY".to_string(), self.entry.clone()),
            (
                "PGEXT_INSTALL_DIR".to_string(),
                self.install_dir.display().to_string(),
            ),
            (
                "PGEXT_STAGING_ROOT".to_string(),
                self.staging_root.display().to_string(),
            ),
            ("PGEXT_JOBS".to_string(), self.jobs.to_string()),
            ("PGEXT_FEATURES".to_string(), self.features.join(",")),
        ]
    }

    fn jobs_flag(&self) -> String {
        format!("-j{}", self.jobs.max(1))
    }
}

/// One command invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub program: String,
    pub args: Vec<String>,
    /// Relative to the build directory; `None` runs in the build directory.
    pub cwd: Option<PathBuf>,
}

impl Step {
    pub fn new<I, S>(program: &str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.to_string(),
            args: args.into_iter().map(Into::into).collect(),
            cwd: None,
        }
    }

    pub fn in_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Shell-like rendering for logs and error messages.
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Strategy for one native build system.
pub trait BuildBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether `features` change the invocation.
    fn accepts_features(&self) -> bool {
        false
    }

    /// Commands to run, in order, from the build directory.
    fn steps(&self, ctx: &BackendContext) -> Vec<Step>;

    /// Where the installed tree ends up.
    fn artifact_dir(&self, ctx: &BackendContext) -> PathBuf {
        ctx.install_dir.clone()
    }
}

/// PGXS makefiles driven through `pg_config`.
pub struct Pgxs;

impl BuildBackend for Pgxs {
    fn name(&self) -> &'static str {
        "pgxs"
    }

    fn steps(&self, ctx: &BackendContext) -> Vec<Step> {
        let pg_config = format!("PG_CONFIG={}", ctx.pg_config);
        vec![
            Step::new("make", ["USE_PGXS=1".to_string(), pg_config.clone(), ctx.jobs_flag()]),
            Step::new(
                "make",
                [
                    "USE_PGXS=1".to_string(),
                    pg_config,
                    "install".to_string(),
                    format!("DESTDIR={}", ctx.install_dir.display()),
                ],
            ),
        ]
    }
}

/// Rust extensions packaged with `cargo pgrx`.
pub struct Pgrx;

impl BuildBackend for Pgrx {
    fn name(&self) -> &'static str {
        "pgrx"
    }

    fn accepts_features(&self) -> bool {
        true
    }

    fn steps(&self, ctx: &BackendContext) -> Vec<Step> {
        let mut args = vec![
            "pgrx".to_string(),
            "package".to_string(),
            "--pg-config".to_string(),
            ctx.pg_config.clone(),
            "--out-dir".to_string(),
            ctx.install_dir.display().to_string(),
        ];
        if !ctx.features.is_empty() {
            args.push("--features".to_string());
            args.push(ctx.features.join(","));
        }
        if ctx.disable_default_features {
            args.push("--no-default-features".to_string());
        }
        vec![Step::new("cargo", args)]
    }
}

/// CMake projects; features become `-D<FEATURE>=ON` cache entries.
pub struct Cmake;

impl BuildBackend for Cmake {
    fn name(&self) -> &'static str {
        "cmake"
    }

    fn accepts_features(&self) -> bool {
        true
    }

    fn steps(&self, ctx: &BackendContext) -> Vec<Step> {
        let mut configure = vec![
            "-S".to_string(),
            ".".to_string(),
            "-B".to_string(),
            "build".to_string(),
            "-DCMAKE_BUILD_TYPE=Release".to_string(),
            format!("-DCMAKE_INSTALL_PREFIX={}", ctx.install_dir.display()),
            format!("-DPG_CONFIG={}", ctx.pg_config),
        ];
        configure.extend(ctx.features.iter().map(|f| format!("-D{f}=ON")));
        vec![
            Step::new("cmake", configure),
            Step::new(
                "cmake",
                [
                    "--build".to_string(),
                    "build".to_string(),
                    "--parallel".to_string(),
                    ctx.jobs.max(1).to_string(),
                ],
            ),
            Step::new("cmake", ["--install", "build"]),
        ]
    }
}

/// Meson projects; features become `-D<feature>=enabled` options.
pub struct Meson;

impl BuildBackend for Meson {
    fn name(&self) -> &'static str {
        "meson"
    }

    fn accepts_features(&self) -> bool {
        true
    }

    fn steps(&self, ctx: &BackendContext) -> Vec<Step> {
        let mut setup = vec![
            "setup".to_string(),
            "build".to_string(),
            format!("--prefix={}", ctx.install_dir.display()),
            "--buildtype=release".to_string(),
        ];
        setup.extend(ctx.features.iter().map(|f| format!("-D{f}=enabled")));
        vec![
            Step::new("meson", setup),
            Step::new("meson", ["compile".to_string(), "-C".to_string(), "build".to_string(), ctx.jobs_flag()]),
            Step::new("meson", ["install", "-C", "build"]),
        ]
    }
}

/// `./configure && make && make install`; features become `--enable-<f>`.
pub struct Autotools;

impl BuildBackend for Autotools {
    fn name(&self) -> &'static str {
        "autotools"
    }

    fn accepts_features(&self) -> bool {
        true
    }

    fn steps(&self, ctx: &BackendContext) -> Vec<Step> {
        let mut steps = Vec::new();
        if !ctx.build_dir.join("configure").exists() {
            steps.push(Step::new("autoreconf", ["-fi"]));
        }
        let mut configure = vec![
            format!("--prefix={}", ctx.install_dir.display()),
            format!("--with-pgconfig={}", ctx.pg_config),
        ];
        configure.extend(ctx.features.iter().map(|f| format!("--enable-{f}")));
        steps.push(Step::new("sh", std::iter::once("./configure".to_string()).chain(configure)));
        steps.push(Step::new("make", [ctx.jobs_flag()]));
        steps.push(Step::new("make", ["install"]));
        steps
    }
}

/// Plain makefiles without PGXS.
pub struct Make;

impl BuildBackend for Make {
    fn name(&self) -> &'static str {
        "make"
    }

    fn steps(&self, ctx: &BackendContext) -> Vec<Step> {
        vec![
            Step::new("make", [ctx.jobs_flag()]),
            Step::new(
                "make",
                [
                    "install".to_string(),
                    format!("DESTDIR={}", ctx.install_dir.display()),
                ],
            ),
        ]
    }
}

/// An entry-provided script run with `sh` from the build directory. The
/// script installs into `$PGEXT_INSTALL_DIR` itself.
pub struct Script {
    pub script: String,
}

impl BuildBackend for Script {
    fn name(&self) -> &'static str {
        "script"
    }

    fn accepts_features(&self) -> bool {
        true
    }

    fn steps(&self, _ctx: &BackendContext) -> Vec<Step> {
        vec![Step::new("sh", [self.script.clone()])]
    }
}

/// The strategy for a catalog backend.
pub fn strategy(backend: &Backend) -> Box<dyn BuildBackend> {
    match backend {
        Backend::Pgxs => Box::new(Pgxs),
        Backend::Pgrx => Box::new(Pgrx),
        Backend::Cmake => Box::new(Cmake),
        Backend::Meson => Box::new(Meson),
        Backend::Autotools => Box::new(Autotools),
        Backend::Make => Box::new(Make),
        Backend::Script { script } => Box::new(Script {
            script: script.clone(),
        }),
    }
}

/// Resolve a step's working directory against the build directory.
pub fn step_dir(build_dir: &Path, step: &Step) -> PathBuf {
    match &step.cwd {
        Some(cwd) => build_dir.join(cwd),
        None => build_dir.to_path_buf(),
    }
}
