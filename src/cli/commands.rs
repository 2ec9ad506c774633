use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "emberchain")]
pub struct Opt {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    #[command(name = "startnode", about = "Start a ledger node")]
    StartNode {
        #[arg(long, help = "Listen address, host:port (overrides NODE_ADDRESS)")]
        addr: Option<String>,
        #[arg(long = "peer", help = "Peer address to connect to on startup")]
        peers: Vec<String>,
        #[arg(long, help = "Mine blocks continuously from the mempool")]
        mine: bool,
    },
    #[command(name = "address", about = "Print this node's wallet address")]
    Address,
}
