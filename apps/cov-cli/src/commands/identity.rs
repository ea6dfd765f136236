// identity.rs: Identity subcommands (ensure, rotate, show).

use clap::Subcommand;
use cov_identity::IdentityAuthority;

use crate::config::CovenantConfig;

#[derive(Subcommand)]
pub enum IdentityCommands {
    /// Create the signing identity if none exists, and print it.
    Ensure,
    /// Replace the signing keypair. Old signatures stay verifiable.
    Rotate,
    /// Print the current and retired public identities.
    Show,
}

pub fn execute(cmd: &IdentityCommands, config: &CovenantConfig) -> anyhow::Result<()> {
    match cmd {
        IdentityCommands::Ensure => {
            let authority = IdentityAuthority::load(&config.identity_dir)?;
            let public = authority.ensure_identity()?;
            println!("{}", public);
        }

        IdentityCommands::Rotate => {
            let authority = IdentityAuthority::load(&config.identity_dir)?;
            let previous = authority.public_identity();
            let public = authority.rotate_identity()?;
            if let Some(previous) = previous {
                println!("Retired: {}", previous);
            }
            println!("Current: {}", public);
        }

        IdentityCommands::Show => {
            let authority = IdentityAuthority::load(&config.identity_dir)?;
            match authority.public_identity() {
                Some(public) => println!("Current: {}", public),
                None => {
                    println!(
                        "No identity at {}. Run `cov identity ensure`.",
                        config.identity_dir.display()
                    );
                    return Ok(());
                }
            }
            for retired in authority.retired_identities().iter().rev() {
                println!("Retired: {}", retired);
            }
        }
    }

    Ok(())
}
