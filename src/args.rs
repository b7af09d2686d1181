use clap::Args;

#[derive(Debug, Clone, Args)]
pub struct BaseArgs {
    /// Use NUM workers in parallel
    #[arg(long, value_name = "NUM", default_value_t = 16, global = true)]
    pub workers: usize,

    /// Print per-customer progress detail
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,
}

#[derive(Debug, Clone, Args)]
pub struct CLIArgs<T: Args> {
    #[command(flatten)]
    pub base: BaseArgs,

    #[command(flatten)]
    pub args: T,
}
