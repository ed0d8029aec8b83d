use clap::Parser;

/// This is a Single Transferable Vote tabulation program for form-style
/// rank tables.
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// (file path) The CSV export of the election form. Columns whose header
    /// ends with ']' are vote columns, named 'Role [Candidate]'; every other
    /// column is ignored.
    #[clap(value_parser)]
    pub input: String,

    /// The role to count, or 'all' to count every role found in the input.
    /// Seats and exclusions only apply when a single role is selected.
    #[clap(short, long, value_parser, default_value = "all")]
    pub role: String,

    /// Number of seats to fill for the selected role.
    #[clap(short, long, value_parser, default_value_t = 1)]
    pub seats: u32,

    /// Candidates to exclude from the count before it starts. May be
    /// repeated. Each name must exist for the selected role.
    #[clap(short, long, value_parser)]
    pub exclude: Vec<String>,

    /// If set, a total tie (one that neither the round history nor the raw
    /// preference scan can resolve) is settled by a draw seeded with this
    /// value instead of failing. The same seed reproduces the same outcome.
    #[clap(long, value_parser)]
    pub random_seed: Option<u32>,

    /// (file path, 'stdout' or empty) If specified, the summary of the
    /// election will be written in JSON format to the given location.
    #[clap(short, long, value_parser)]
    pub out: Option<String>,

    /// (file path) A reference file containing the outcome of an election in
    /// JSON format. If provided, stvtally will check that the tabulated
    /// output matches the reference.
    #[clap(long, value_parser)]
    pub reference: Option<String>,

    // Other arguments
    /// If passed as an argument, will turn on verbose logging to the standard
    /// output.
    #[clap(long, takes_value = false)]
    pub verbose: bool,
}
