#![allow(non_snake_case)]
use RustedNonlinear::Examples::nonlinear_examples::NonlinearExample;
use RustedNonlinear::numerical::Nonlinear_systems::NL_solver::NonlinearSolver;
use RustedNonlinear::numerical::Nonlinear_systems::config::Strategy;
use RustedNonlinear::numerical::Nonlinear_systems::problem::Problem;
use RustedNonlinear::somelinalg::LUsolver::LUsolver;
use RustedNonlinear::somelinalg::nvector::NVector;
use strum::IntoEnumIterator;

fn main() {
    let example = 0;
    match example {
        0 => {
            // every catalogue problem with its default configuration
            for problem in NonlinearExample::iter() {
                match problem.solve(Some("info")) {
                    Ok(u) => println!("{}: solution {}", problem, u),
                    Err(e) => println!("{}: failed, {}", problem, e),
                }
            }
        }
        1 => {
            // Robertson with and without Anderson acceleration
            let example = NonlinearExample::Robertson;
            for depth in [0, 3] {
                let mut solver = NonlinearSolver::new(Strategy::FixedPointIteration);
                solver.set_loglevel(Some("warn")).unwrap();
                solver.set_anderson(depth, 0);
                let mut problem = example.problem();
                let u = solver.solve(&mut problem, example.initial_guess()).unwrap();
                println!(
                    "Anderson depth {}: u = {}, iterations {}",
                    depth,
                    u,
                    solver.statistics().iterations
                );
            }
        }
        2 => {
            // Ferraris-Tronconi from both starting points
            for example in [
                NonlinearExample::FerrarisTronconiLower,
                NonlinearExample::FerrarisTronconiCenter,
            ] {
                let mut solver = example.solver(Some("info")).unwrap();
                let mut problem = example.problem();
                let u = solver.solve(&mut problem, example.initial_guess()).unwrap();
                println!("{}: x1 = {}, x2 = {}", example, u[0], u[1]);
                println!("{:?}", solver.statistics());
            }
        }
        3 => {
            // the same system with every Newton-type strategy
            for strategy in [Strategy::NewtonsMethod, Strategy::BacktrackingLineSearch] {
                let mut problem = Problem::new(2, |u: &NVector| {
                    Ok(NVector::from_vec(vec![u[0] * u[0] + u[1] * u[1] - 4.0, u[0] - u[1]]))
                });
                let mut solver = NonlinearSolver::with_linear_solver(strategy, Box::new(LUsolver::new()));
                solver.set_loglevel(Some("debug")).unwrap();
                match solver.solve(&mut problem, NVector::from_vec(vec![1.0, 0.5])) {
                    Ok(u) => println!("{}: {}", strategy, u),
                    Err(e) => println!("{}: {}", strategy, e),
                }
            }
        }
        _ => {
            println!("example {} does not exist", example);
        }
    }
}
