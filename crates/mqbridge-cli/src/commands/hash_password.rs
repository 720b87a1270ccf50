use anyhow::{Context, Result, bail};
use clap::Args;

#[derive(Args, Debug)]
pub struct HashPasswordCommand {
    /// Password to hash (visible in the process list)
    pub password: String,

    /// Bcrypt cost factor (4-31)
    #[arg(long, default_value_t = 8)]
    pub cost: u32,
}

pub fn execute(cmd: HashPasswordCommand) -> Result<()> {
    let hash = hash(&cmd)?;
    println!("{}", hash);
    Ok(())
}

fn hash(cmd: &HashPasswordCommand) -> Result<String> {
    if !(4..=31).contains(&cmd.cost) {
        bail!("Bcrypt cost must be between 4 and 31");
    }
    bcrypt::hash(&cmd.password, cmd.cost).context("Failed to hash password")
}
