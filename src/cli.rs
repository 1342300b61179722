use clap::Parser;
use std::ffi::OsString;
use std::path::PathBuf;

/// Mirror a local directory tree to an HTTP upload endpoint.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Profile (app) in the config file to watch
    #[arg(short, long)]
    pub app: String,

    /// Path of the JSON config file
    #[arg(short, long, env = "FSMIRROR_CONFIG", default_value = "./conf.json")]
    pub conf: PathBuf,
}

impl Args {
    /// Parses the command line, accepting the single-dash `-app` / `-conf`
    /// spellings as well.
    pub fn parse_with_legacy_flags() -> Self {
        Self::parse_from(normalize_legacy_flags(std::env::args_os()))
    }
}

const LEGACY_LONG_FLAGS: [&str; 2] = ["app", "conf"];

/// Rewrites `-app x`, `-app=x`, `-conf x` and `-conf=x` to their `--` forms.
/// Everything else passes through untouched.
pub fn normalize_legacy_flags<I>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = OsString>,
{
    args.into_iter()
        .map(|arg| {
            let Some(s) = arg.to_str() else {
                return arg;
            };
            let Some(rest) = s.strip_prefix('-').filter(|r| !r.starts_with('-')) else {
                return arg;
            };
            let flag = rest.split_once('=').map_or(rest, |(name, _)| name);
            if LEGACY_LONG_FLAGS.contains(&flag) {
                OsString::from(format!("-{}", s))
            } else {
                arg
            }
        })
        .collect()
}
