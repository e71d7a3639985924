use std::process;

use clap::Parser as ClapParser;

use rho::{
    ArenaSettings, Expr, ExprArg, Formal, Interpreter, InterpreterCreateInfo,
    RuntimeError, Symbol,
};

#[derive(ClapParser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Cell sizes of the arena pools, smallest first
    #[arg(long, value_delimiter = ',', default_values_t = [32, 64, 128, 256])]
    cell_sizes: Vec<usize>,

    #[arg(long, default_value_t = 65536, help = "Superblock size in bytes")]
    superblock_size: usize,

    #[arg(long, help = "Abort once a pool holds this many superblocks")]
    max_superblocks: Option<usize>,

    /// Collect before every allocation
    #[arg(long)]
    torture: bool,

    #[arg(long, default_value_t = 1000, help = "Dispatches in the stress loop")]
    iterations: usize,
}

fn sym(interp: &Interpreter, name: &str) -> Expr {
    Expr::Symbol(interp.symbols.intern(name))
}

fn call(interp: &Interpreter, name: &str, args: Vec<Expr>) -> Expr {
    Expr::call(sym(interp, name), args.into_iter().map(ExprArg::new).collect())
}

fn define(interp: &mut Interpreter, name: &str, value: Expr) -> Result<(), RuntimeError> {
    let name: Symbol = interp.symbols.intern(name);
    interp.eval_toplevel(Expr::assign(name, value)).map(drop)
}

/// speak <- function(x, ...) UseMethod("speak")
/// speak.A <- function(x, ...) "A"
/// speak.B <- function(x, ...) c("B", NextMethod())
fn install_demo(interp: &mut Interpreter) -> Result<(), RuntimeError> {
    let x = interp.symbols.intern("x");
    let dots = interp.syms.dots;
    let formals = || vec![Formal::new(x), Formal::new(dots)];

    let generic = call(interp, "UseMethod", vec![Expr::string("speak")]);
    define(interp, "speak", Expr::function(formals(), generic))?;
    define(interp, "speak.A", Expr::function(formals(), Expr::string("A")))?;
    let next = call(interp, "NextMethod", vec![]);
    let body = call(interp, "c", vec![Expr::string("B"), next]);
    define(interp, "speak.B", Expr::function(formals(), body))?;

    let classes = call(interp, "c", vec![Expr::string("B"), Expr::string("A")]);
    let object = call(interp, "class<-", vec![Expr::int(1), classes]);
    define(interp, "obj", object)
}

fn run(cli: &Cli) -> Result<(), RuntimeError> {
    let info = InterpreterCreateInfo {
        arena: ArenaSettings {
            cell_sizes: cli.cell_sizes.clone(),
            superblock_size: cli.superblock_size,
            max_superblocks: cli.max_superblocks,
            torture: cli.torture,
        },
        ..Default::default()
    };
    let mut interp = match Interpreter::new(info) {
        Ok(interp) => interp,
        Err(err) => {
            eprintln!("Error: {err}");
            process::exit(2);
        }
    };

    install_demo(&mut interp)?;
    let speak = call(&interp, "speak", vec![sym(&interp, "obj")]);
    let value = interp.eval_toplevel(speak.clone())?;
    println!("speak(obj) = {:?}", interp.as_strings(value).unwrap_or_default());

    for _ in 0..cli.iterations {
        interp.eval_toplevel(speak.clone())?;
    }

    for warning in interp.take_warnings() {
        println!("warning: {warning}");
    }
    if let Err(err) = interp.verify() {
        eprintln!("Error: {err}");
        process::exit(1);
    }

    let stats = interp.gc_stats();
    println!(
        "collections: {}, last reclaimed: {}, total reclaimed: {}",
        stats.collections, stats.last_reclaimed, stats.total_reclaimed
    );
    println!(
        "cells: {} allocated, {} free, {} total",
        interp.arena().allocated_cells(),
        interp.arena().free_cells(),
        interp.arena().total_cells()
    );
    Ok(())
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();
    if let Err(err) = run(&cli) {
        eprintln!("Error: {err}");
        process::exit(1);
    }
}
