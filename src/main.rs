use anyhow::Context;
use clap::Parser;
use cdn_site::config::{self, Cli, Command, FileConfig};
use cdn_site::graph::NodeKind;
use cdn_site::logger;
use cdn_site::variables::Variables;
use cdn_site::SiteInput;

fn load_input(cli: &Cli) -> anyhow::Result<SiteInput> {
    let mut vars = Variables::from_process();
    if vars.load_dot_env(&cli.env_file)? {
        tracing::info!("loaded variables from {:?}", cli.env_file);
    }
    let file = match &cli.config {
        Some(path) => FileConfig::from_file(path).with_context(|| format!("reading {:?}", path))?,
        None => FileConfig::default(),
    };
    Ok(config::resolve(&cli.overrides, &vars, &file)?)
}

fn plan(input: &SiteInput) -> anyhow::Result<()> {
    let declaration = cdn_site::declare(input)?;
    let stacks = declaration.stacks()?;
    println!("site: https://{}", declaration.site_domain);
    println!("\nresources, in deployment order:");
    for node in declaration.graph.topological_order()? {
        let region = node.region.as_deref().unwrap_or("-");
        let deps: Vec<&str> = node.depends_on.iter().map(|d| d.as_str()).collect();
        println!(
            "  {:<28} {:<38} {:<14} <- [{}]",
            node.id,
            node.kind.type_string(),
            region,
            deps.join(", ")
        );
        if let NodeKind::Deployment(d) = &node.kind {
            println!(
                "  {:<28} uploads {:?}, invalidates {}",
                "",
                d.source,
                d.distribution_paths.join(" ")
            );
        }
    }
    println!("\nstacks:");
    for stack in &stacks.stacks {
        println!(
            "  {} ({}) {} resources",
            stack.name,
            stack.region,
            stack.template.resources.len()
        );
    }
    println!("\noutputs:");
    for output in declaration.outputs.named() {
        println!("  {:<20} {}", output.key, output.value);
    }
    Ok(())
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let input = load_input(&cli)?;
    match &cli.command {
        Command::Synth { out_dir } => {
            let out = cdn_site::synth(&input, out_dir)?;
            println!("✅ wrote {} template(s) and {:?}", out.templates.len(), out.script);
            println!("run {:?} from this directory to deploy", out.script);
        }
        Command::Plan => plan(&input)?,
    }
    Ok(())
}

fn main() {
    let cli = Cli::parse();
    logger::init_cli_logger(cli.verbose);
    if cli.verbose {
        tracing::debug!("CLI config: {:?}", cli);
    }

    if let Err(e) = run(cli) {
        tracing::error!("❌ {:#}", e);
        eprintln!("❌ {:#}", e);
        std::process::exit(1);
    }
}
