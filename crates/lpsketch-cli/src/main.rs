use clap::{Parser, Subcommand};
use lpsketch_lang::{Lexer, Polynomial, TokenKind, parse_expression, parse_relation};
use lpsketch_model::{
    AssignmentConfig, AssignmentModel, CostMatrix, LinearModel, ModelError, PlotConfig, Session,
};
use lpsketch_solver::{ConstraintOp, Sense, VarCategory};
use serde_json::json;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "lpsketch")]
#[command(about = "Build and solve small linear programs from algebraic text", long_about = None)]
struct Cli {
    /// Log debug detail to stderr
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse an expression or relation and show its linear form
    Parse {
        /// Text such as "4x + y <= 0"
        text: String,
        /// Output format (json, pretty)
        #[arg(short, long, default_value = "pretty")]
        format: String,
    },
    /// Solve a linear program
    Solve {
        /// Objective function, e.g. "2x + 3y"
        #[arg(short, long)]
        objective: String,
        /// Maximize instead of minimize
        #[arg(long)]
        max: bool,
        /// Constraint relation, e.g. "x + y >= 4" (repeatable)
        #[arg(short, long = "constraint")]
        constraints: Vec<String>,
        /// Write the feasible region as SVG (two variables at most)
        #[arg(long)]
        plot: Option<PathBuf>,
        /// Output format (json, pretty)
        #[arg(short, long, default_value = "pretty")]
        format: String,
    },
    /// Solve a resource assignment problem from a JSON cost file
    Assign {
        /// JSON file: {"resources": [...], "tasks": [...], "costs": [[...]]}
        costs: PathBuf,
        /// Resources every task needs
        #[arg(long, default_value_t = 1)]
        resources_per_task: u32,
        /// Tasks each resource may take on
        #[arg(long, default_value_t = 1)]
        tasks_per_resource: u32,
        /// Allow tasks to stay unassigned
        #[arg(long)]
        allow_unassigned: bool,
        /// Use continuous instead of binary assignment variables
        #[arg(long)]
        continuous: bool,
        /// Output format (json, pretty)
        #[arg(short, long, default_value = "pretty")]
        format: String,
    },
    /// Run session commands from a script file, or stdin
    Session {
        /// Script with one command per line
        script: Option<PathBuf>,
    },
}

/// Cost file layout; labels are optional
#[derive(serde::Deserialize)]
struct CostFile {
    #[serde(default)]
    resources: Vec<String>,
    #[serde(default)]
    tasks: Vec<String>,
    costs: Vec<Vec<f64>>,
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn fail(message: impl std::fmt::Display) -> ! {
    eprintln!("Error: {}", message);
    std::process::exit(1);
}

fn sense(max: bool) -> Sense {
    if max { Sense::Maximize } else { Sense::Minimize }
}

/// Split `lhs <op> rhs` where the right side folds to a number
fn split_constraint(text: &str) -> Result<(&str, ConstraintOp, f64), String> {
    let comparator = Lexer::tokenize(text)
        .into_iter()
        .find(|t| t.kind.is_comparator())
        .ok_or_else(|| format!("no comparator in '{}'", text))?;

    let op = match comparator.kind {
        TokenKind::Le => ConstraintOp::Le,
        TokenKind::Ge => ConstraintOp::Ge,
        TokenKind::Assign | TokenKind::EqEq => ConstraintOp::Eq,
        _ => return Err(format!("strict comparator '{}' is not allowed", comparator.text)),
    };

    let lhs = &text[..comparator.span.start];
    let rhs_text = &text[comparator.span.end..];
    let rhs = parse_expression(rhs_text)
        .map_err(|e| e.to_string())
        .and_then(|expr| Polynomial::from_expr(&expr).map_err(|e| e.to_string()))?
        .as_constant()
        .ok_or_else(|| format!("right-hand side '{}' must be a number", rhs_text.trim()))?;
    Ok((lhs, op, rhs))
}

fn write_plot(path: &Path, svg: &str) {
    if let Err(e) = std::fs::write(path, svg) {
        fail(format!("writing {}: {}", path.display(), e));
    }
    println!("Wrote {}", path.display());
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Parse { text, format } => run_parse(&text, &format),
        Commands::Solve {
            objective,
            max,
            constraints,
            plot,
            format,
        } => run_solve(&objective, max, &constraints, plot.as_deref(), &format),
        Commands::Assign {
            costs,
            resources_per_task,
            tasks_per_resource,
            allow_unassigned,
            continuous,
            format,
        } => {
            let config = AssignmentConfig {
                max_resources_per_task: resources_per_task,
                max_tasks_per_resource: tasks_per_resource,
                allow_unassigned_tasks: allow_unassigned,
                category: if continuous { VarCategory::Continuous } else { VarCategory::Binary },
            };
            run_assign(&costs, config, &format);
        }
        Commands::Session { script } => run_session(script.as_deref()),
    }
}

fn run_parse(text: &str, format: &str) {
    let is_relation = Lexer::tokenize(text).iter().any(|t| t.kind.is_comparator());

    let (tree, display, polynomial) = if is_relation {
        let relation = parse_relation(text).unwrap_or_else(|e| fail(format!("Parse error: {}", e)));
        let polynomial = Polynomial::from_relation(&relation).unwrap_or_else(|e| fail(e));
        (serde_json::to_value(&relation), relation.to_string(), polynomial)
    } else {
        let expr = parse_expression(text).unwrap_or_else(|e| fail(format!("Parse error: {}", e)));
        let polynomial = Polynomial::from_expr(&expr).unwrap_or_else(|e| fail(e));
        (serde_json::to_value(&expr), expr.to_string(), polynomial)
    };
    let linear = polynomial.check_linear().is_ok();

    if format == "json" {
        let output = json!({
            "ast": tree.unwrap_or_else(|e| fail(e)),
            "expanded": polynomial.to_string(),
            "variables": polynomial.variables(),
            "linear": linear,
        });
        println!("{}", serde_json::to_string_pretty(&output).unwrap_or_else(|e| fail(e)));
    } else {
        println!("Parsed:    {}", display);
        println!("Expanded:  {}", polynomial);
        let variables: Vec<_> = polynomial.variables().into_iter().collect();
        println!("Variables: {}", variables.join(", "));
        for name in &variables {
            println!("  {:10} {}", name, polynomial.linear_coefficient(name));
        }
        println!("Linear:    {}", if linear { "yes" } else { "no" });
    }
}

fn run_solve(objective: &str, max: bool, constraints: &[String], plot: Option<&Path>, format: &str) {
    let mut model = LinearModel::new(objective, sense(max)).unwrap_or_else(|e| fail(e));
    for relation in constraints {
        model
            .add_relation(relation)
            .unwrap_or_else(|e| fail(format!("constraint '{}': {}", relation, e)));
    }
    debug!(constraints = model.num_constraints(), "model ready");

    let outcome = model.solve();
    let status = model.status().map(|s| s.to_string()).unwrap_or_default();

    if format == "json" {
        let output = json!({
            "status": status,
            "code": model.status().map(|s| s.code()),
            "objective_value": outcome.as_ref().ok(),
            "solution": model.solution(),
            "violations": model.violations().iter().map(|v| &v.description).collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&output).unwrap_or_else(|e| fail(e)));
    } else {
        println!("Objective: {} {}", model.sense(), model.objective_text());
        for constraint in model.constraints() {
            println!("  {:16} {}", constraint.name(), constraint.label);
        }
        println!();
        println!("Status: {}", status.to_uppercase());

        if let Some(solution) = model.solution().filter(|_| outcome.is_ok()) {
            println!("Objective value: {:.4}", solution.objective_value);
            println!();
            println!("Variables:");
            for name in model.variables() {
                println!("  {:16} {:12.4}", name, solution.values[name]);
            }
            if !solution.binding_constraints.is_empty() {
                println!();
                println!("Binding constraints:");
                for name in &solution.binding_constraints {
                    println!("  - {}", name);
                }
            }
        } else {
            for violation in model.violations() {
                println!("  {}", violation.description);
            }
        }
    }

    if let Some(path) = plot {
        let config = match model.solution_point() {
            Some(point) => PlotConfig::default().fit_to(point),
            None => PlotConfig::default(),
        };
        match lpsketch_model::FeasibleRegion::from_model(&model, config)
            .and_then(|region| lpsketch_model::render_svg(&region))
        {
            Ok(svg) => write_plot(path, &svg),
            // The textual result above still stands
            Err(e @ (ModelError::TooManyVariables(_) | ModelError::TooFewVariables)) => {
                eprintln!("Plot skipped: {}", e)
            }
            Err(e) => fail(e),
        }
    }

    if outcome.is_err() {
        std::process::exit(1);
    }
}

fn run_assign(path: &Path, config: AssignmentConfig, format: &str) {
    let source = std::fs::read_to_string(path)
        .unwrap_or_else(|e| fail(format!("reading {}: {}", path.display(), e)));
    let file: CostFile = serde_json::from_str(&source).unwrap_or_else(|e| fail(format!("cost file: {}", e)));
    let costs = CostMatrix::new(file.costs).unwrap_or_else(|e| fail(e));

    let resource_label = |i: usize| file.resources.get(i).cloned().unwrap_or_else(|| format!("resource {}", i));
    let task_label = |j: usize| file.tasks.get(j).cloned().unwrap_or_else(|| format!("task {}", j));

    let mut model = AssignmentModel::new(costs, config);
    let total = model.solve().unwrap_or_else(|e| fail(e));
    let assignment = model.get_solution().cloned().unwrap_or_default();

    if format == "json" {
        let cells: Vec<_> = assignment
            .iter()
            .map(|(&(r, t), &amount)| {
                json!({
                    "resource": resource_label(r),
                    "task": task_label(t),
                    "amount": amount,
                    "cost": model.costs().get(r, t),
                })
            })
            .collect();
        let output = json!({ "total_cost": total, "assignments": cells });
        println!("{}", serde_json::to_string_pretty(&output).unwrap_or_else(|e| fail(e)));
    } else {
        let (resources, tasks) = model.costs().shape();
        println!("{} resources x {} tasks", resources, tasks);
        println!("Total cost: {:.2}", total);
        println!();
        for (&(r, t), &amount) in &assignment {
            let cost = model.costs().get(r, t).unwrap_or_default();
            println!("  {:16} -> {:16} {:6.2} (cost {:.2})", resource_label(r), task_label(t), amount, cost);
        }
    }
}

/// Run one script line against the session
fn run_command(session: &mut Session, line: &str) -> Result<(), String> {
    let (command, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
    let rest = rest.trim();

    match command {
        "objective" => {
            let (direction, text) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
            let sense = match direction {
                "max" => Sense::Maximize,
                "min" => Sense::Minimize,
                other => return Err(format!("expected 'max' or 'min', found '{}'", other)),
            };
            let rebuilt = session.set_objective(text, sense).map_err(|e| e.to_string())?;
            println!("{}", if rebuilt { "objective set" } else { "objective unchanged" });
        }
        "constraint" => {
            let (lhs, op, rhs) = split_constraint(rest)?;
            let name = session.add_constraint(lhs, op, rhs).map_err(|e| e.to_string())?;
            println!("added {}", name);
        }
        "remove" => {
            let position: usize = rest.parse().map_err(|_| format!("invalid position '{}'", rest))?;
            let label = session.remove_constraint(position).map_err(|e| e.to_string())?;
            println!("removed {}", label);
        }
        "clear" => {
            session.clear_constraints();
            println!("constraints cleared");
        }
        "list" => {
            let model = session.model().ok_or_else(|| ModelError::NoObjective.to_string())?;
            println!("{} {}", model.sense(), model.objective_text());
            for (i, constraint) in model.constraints().enumerate() {
                println!("  [{}] {:16} {}", i, constraint.name(), constraint.label);
            }
        }
        "solve" => {
            let value = session.solve().map_err(|e| e.to_string())?;
            println!("optimal value {:.4}", value);
            if let Some(solution) = session.solution() {
                for (name, value) in &solution.values {
                    println!("  {} = {:.4}", name, value);
                }
            }
        }
        "plot" => {
            if rest.is_empty() {
                return Err("plot needs an output path".to_string());
            }
            let svg = session.render_region().map_err(|e| e.to_string())?;
            write_plot(Path::new(rest), &svg);
        }
        "reset" => {
            session.reset();
            println!("session reset");
        }
        other => return Err(format!("unknown command '{}'", other)),
    }
    Ok(())
}

fn run_session(script: Option<&Path>) {
    let reader: Box<dyn BufRead> = match script {
        Some(path) => match std::fs::File::open(path) {
            Ok(file) => Box::new(BufReader::new(file)),
            Err(e) => fail(format!("reading {}: {}", path.display(), e)),
        },
        None => Box::new(BufReader::new(std::io::stdin())),
    };

    let mut session = Session::new();
    let mut failures = 0;
    for (number, line) in reader.lines().enumerate() {
        let line = line.unwrap_or_else(|e| fail(e));
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        // Errors are reported and the session carries on with its state intact
        if let Err(message) = run_command(&mut session, line) {
            eprintln!("line {}: {}", number + 1, message);
            failures += 1;
        }
    }

    if failures > 0 {
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_constraint() {
        let (lhs, op, rhs) = split_constraint("x + y >= 2*2").unwrap();
        assert_eq!(lhs, "x + y ");
        assert_eq!(op, ConstraintOp::Ge);
        assert_eq!(rhs, 4.0);

        assert_eq!(split_constraint("x ≤ 3").unwrap().1, ConstraintOp::Le);
        assert_eq!(split_constraint("x = 3").unwrap().1, ConstraintOp::Eq);
        assert!(split_constraint("x < 3").is_err());
        assert!(split_constraint("x + y").is_err());
        assert!(split_constraint("x <= y").is_err());
    }

    #[test]
    fn test_session_script() {
        let mut session = Session::new();
        for line in [
            "objective min 2x + 3y",
            "constraint x + y >= 4",
            "constraint x <= 3",
            "constraint y <= 3",
            "solve",
        ] {
            run_command(&mut session, line).unwrap();
        }
        assert!((session.solution().unwrap().objective_value - 9.0).abs() < 1e-6);

        assert!(run_command(&mut session, "constraint y + x >= 4").is_err());
        assert!(run_command(&mut session, "objective sideways x").is_err());
        assert!(run_command(&mut session, "frobnicate").is_err());

        run_command(&mut session, "remove 1").unwrap();
        assert_eq!(session.model().unwrap().num_constraints(), 2);
        run_command(&mut session, "reset").unwrap();
        assert!(session.model().is_none());
    }
}
