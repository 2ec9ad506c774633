use clap::Parser;
use emberchain::{Blockchain, Command, Opt, SyncServer, Wallet, GLOBAL_CONFIG};
use log::{error, info, LevelFilter};
use std::process;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Pause between mining rounds when running with --mine.
const MINING_PAUSE: Duration = Duration::from_secs(1);

fn main() {
    env_logger::builder().filter_level(LevelFilter::Info).init();

    let opt = Opt::parse();
    if let Err(e) = run_command(opt.command) {
        error!("Error: {e}");
        process::exit(1);
    }
}

fn run_command(command: Command) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Command::StartNode { addr, peers, mine } => {
            if let Some(addr) = addr {
                GLOBAL_CONFIG.set_node_addr(addr);
            }
            let wallet = Wallet::load_or_create(&GLOBAL_CONFIG.get_wallet_file())?;
            info!("Node wallet address: {}", wallet.address());

            let blockchain = Arc::new(Blockchain::new(wallet)?);
            let server = SyncServer::new(Arc::clone(&blockchain));
            server.start(&GLOBAL_CONFIG.get_node_addr())?;

            for peer in peers {
                if let Err(e) = server.connect_to_peer(&peer) {
                    error!("Failed to connect to peer {peer}: {e}");
                }
            }

            if mine {
                info!("Mining is on; rewards go to {}", blockchain.address());
                let miner = Arc::clone(&blockchain);
                thread::spawn(move || loop {
                    match miner.mine_block() {
                        Ok(block) => info!(
                            "Mined block {} at height {}",
                            block.get_hash(),
                            block.get_index()
                        ),
                        Err(e) => error!("Mining round failed: {e}"),
                    }
                    thread::sleep(MINING_PAUSE);
                });
            }

            // The sync server runs on background threads; park the main one.
            loop {
                thread::sleep(Duration::from_secs(60));
            }
        }
        Command::Address => {
            let wallet = Wallet::load_or_create(&GLOBAL_CONFIG.get_wallet_file())?;
            println!("{}", wallet.address());
            Ok(())
        }
    }
}
