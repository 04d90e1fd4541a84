use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start colaunch as a service.
    Daemon {},

    /// Search ideas with the manual filter
    Search {
        /// Title substring, case-insensitive
        #[clap(short, long)]
        title: Option<String>,

        /// Location: "State, Country", or a state/country substring
        #[clap(short, long)]
        location: Option<String>,

        /// Industry filter; repeat for a multi-select
        #[clap(short, long)]
        industry: Vec<String>,

        /// id
        #[clap(long)]
        id: Option<String>,

        /// Restrict to one founder's ideas
        #[clap(short, long)]
        user: Option<String>,

        /// Print the number of matches instead of the matches
        #[clap(short, long)]
        count: bool,

        #[clap(long)]
        limit: Option<usize>,

        #[command(subcommand)]
        action: Option<ActionArgs>,
    },

    /// Add a new idea
    Add {
        #[clap(short, long)]
        title: String,

        #[clap(short, long)]
        description: Option<String>,

        #[clap(short, long)]
        industry: String,

        /// Comma-separated tags
        #[clap(short = 'g', long, allow_hyphen_values = true)]
        tags: Option<String>,

        #[clap(long)]
        url: Option<String>,

        /// Owning founder user id
        #[clap(long)]
        user: String,

        #[clap(long)]
        country: String,

        #[clap(long)]
        state: String,

        #[clap(long, default_value = "")]
        suburb: String,

        /// Media files to upload; repeat for several
        #[clap(short, long)]
        media: Vec<PathBuf>,
    },

    /// Vote on an idea
    Vote {
        id: String,

        /// Downvote instead of upvote
        #[clap(long)]
        down: bool,
    },

    /// Run the voice search pipeline over a transcript
    Voice {
        /// The finished transcript; read from stdin when omitted
        transcript: Option<String>,
    },

    /// Rebuild idea embeddings
    Vectorize {
        /// Restrict to one idea
        #[clap(long)]
        id: Option<String>,

        /// Queue the work on the daemon instead of waiting
        #[clap(long)]
        background: bool,
    },

    /// Manage offers
    Offer {
        #[command(subcommand)]
        action: OfferArgs,
    },

    /// Accept an offer as a distributor
    Deal {
        /// Offer id
        #[clap(long)]
        offer: String,

        /// Accepting distributor user id
        #[clap(long)]
        user: String,
    },

    /// List a user's deals, both sides
    Deals {
        /// User id
        user: String,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum ActionArgs {
    /// Update every matched idea
    Update {
        #[clap(short, long)]
        title: Option<String>,

        #[clap(short, long)]
        description: Option<String>,

        #[clap(short, long)]
        industry: Option<String>,

        #[clap(short = 'g', long, allow_hyphen_values = true)]
        tags: Option<String>,

        #[clap(long, allow_hyphen_values = true)]
        append_tags: Option<String>,

        #[clap(long, allow_hyphen_values = true)]
        remove_tags: Option<String>,

        #[clap(long)]
        url: Option<String>,

        #[clap(long)]
        country: Option<String>,

        #[clap(long)]
        state: Option<String>,

        #[clap(long)]
        suburb: Option<String>,
    },

    /// Delete every matched idea
    Delete {
        /// Do not ask for confirmation
        #[clap(short, long)]
        yes: bool,

        /// Allow deleting with an empty query
        #[clap(long)]
        force: bool,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum OfferArgs {
    /// Attach a new offer to an idea
    Add {
        /// Idea id
        #[clap(long)]
        idea: String,

        /// Offer owner user id
        #[clap(long)]
        user: String,

        /// Commission | Fixed Price | Equity | Revenue Share
        #[clap(short, long)]
        kind: String,

        #[clap(short, long)]
        description: Option<String>,

        /// Commission percentage
        #[clap(short, long, default_value_t = 0.0)]
        commission: f32,

        #[clap(long)]
        payment_link: Option<String>,

        #[clap(long)]
        promotion_code: Option<String>,

        /// Create the offer deactivated
        #[clap(long)]
        inactive: bool,
    },

    /// Update an offer
    Update {
        id: String,

        #[clap(short, long)]
        kind: Option<String>,

        #[clap(short, long)]
        description: Option<String>,

        #[clap(short, long)]
        commission: Option<f32>,

        #[clap(long)]
        active: Option<bool>,

        #[clap(long)]
        payment_link: Option<String>,

        #[clap(long)]
        promotion_code: Option<String>,
    },

    /// List offers attached to an idea
    List {
        /// Idea id
        #[clap(long)]
        idea: String,
    },
}
