use std::env;

use color_eyre::eyre::{OptionExt, Result};

/// Command line of the batch driver: `funds-transfer-engine <commands.csv>`.
pub struct CliArgs {
    pub input_file_path: String,
}

impl CliArgs {
    pub fn load() -> Result<Self> {
        Self::from_args(env::args())
    }

    fn from_args(args: impl IntoIterator<Item = String>) -> Result<Self> {
        let input_file_path = args
            .into_iter()
            .nth(1)
            .ok_or_eyre("Input file not passed")?;

        Ok(CliArgs { input_file_path })
    }
}
