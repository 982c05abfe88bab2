use super::args::{Cli, Command};

pub mod export;
pub mod seal;
pub mod show;
pub mod sweep;
pub mod verify;

pub async fn dispatch(cli: Cli) -> anyhow::Result<i32> {
    match cli.cmd {
        Command::Seal(args) => seal::run(args, &cli.db).await,
        Command::Verify(args) => verify::run(args, &cli.db).await,
        Command::Show(args) => show::run(args, &cli.db),
        Command::Export(args) => export::run(args, &cli.db),
        Command::Sweep(args) => sweep::run(args, &cli.db).await,
    }
}
