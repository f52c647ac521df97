use log::info;
use std::collections::HashMap;
use std::time::{Duration, Instant};

pub fn elapsed_time(elapsed: Duration) -> (String, f64) {
    let time = elapsed.as_millis();
    if time < 1000 {
        info!("Elapsed {} ms", time);
        (" ms ".to_string(), time as f64)
    } else if time < 60_000 {
        info!("Elapsed {} s", elapsed.as_secs());
        (" s".to_string(), elapsed.as_secs() as f64)
    } else if time < 3_600_000 {
        info!("Elapsed {} min", elapsed.as_secs() / 60);
        (" min".to_string(), elapsed.as_secs() as f64 / 60.0)
    } else {
        info!("Elapsed {} h", elapsed.as_secs() / 3600);
        (" h".to_string(), elapsed.as_secs() as f64 / 3600.0)
    }
}

/// Accumulates the time spent in residual evaluations, Jacobian
/// construction and linear solves during one nonlinear solve.
#[derive(Debug, Clone)]
pub struct CustomTimer {
    pub start: Instant,
    pub jac_time: Instant,
    pub jac: Duration,
    pub fun_time: Instant,
    pub fun: Duration,
    pub linear_system_time: Instant,
    pub linear_system: Duration,
}

impl CustomTimer {
    pub fn new() -> CustomTimer {
        CustomTimer {
            start: Instant::now(),
            jac_time: Instant::now(),
            jac: Duration::from_secs(0),
            fun_time: Instant::now(),
            fun: Duration::from_secs(0),
            linear_system_time: Instant::now(),
            linear_system: Duration::from_secs(0),
        }
    }
    pub fn start(&mut self) {
        *self = CustomTimer::new();
    }
    pub fn jac_tic(&mut self) {
        self.jac_time = Instant::now();
    }
    pub fn jac_tac(&mut self) {
        self.jac += self.jac_time.elapsed();
    }
    pub fn fun_tic(&mut self) {
        self.fun_time = Instant::now();
    }
    pub fn fun_tac(&mut self) {
        self.fun += self.fun_time.elapsed();
    }
    pub fn linear_system_tic(&mut self) {
        self.linear_system_time = Instant::now();
    }
    pub fn linear_system_tac(&mut self) {
        self.linear_system += self.linear_system_time.elapsed();
    }

    /// Share of the total wall time per category, entries below 0.5% are skipped
    pub fn get_all(&self) -> HashMap<String, String> {
        let mut timer_data: HashMap<String, String> = HashMap::new();
        let total = self.start.elapsed();
        let total_time = total.as_nanos() as f64;
        let total_time_string = elapsed_time(total);
        timer_data.insert(
            "time elapsed, ".to_string() + total_time_string.0.as_str(),
            format!("{}", total_time_string.1),
        );
        if total_time == 0.0 {
            return timer_data;
        }
        let mut other = total_time;
        for (name, duration) in [
            ("Jacobian", self.jac),
            ("Function", self.fun),
            ("Linear System", self.linear_system),
        ] {
            let part = duration.as_nanos() as f64;
            other -= part;
            let percent = 100.0 * part / total_time;
            if percent > 0.5 {
                let part_string = elapsed_time(duration);
                timer_data.insert(
                    format!("{} (%, {})", name, part_string.0),
                    format!("{}, {}", (percent * 1000.0).round() / 1000.0, part_string.1),
                );
            }
        }
        let other_percent = 100.0 * other / total_time;
        if other_percent > 0.5 {
            timer_data.insert(
                "other %".to_string(),
                format!("{} ", (other_percent * 1000.0).round() / 1000.0),
            );
        }
        timer_data
    }
}

impl Default for CustomTimer {
    fn default() -> Self {
        CustomTimer::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_elapsed_time_units() {
        assert_eq!(elapsed_time(Duration::from_millis(20)).0, " ms ");
        assert_eq!(elapsed_time(Duration::from_secs(5)), (" s".to_string(), 5.0));
        assert_eq!(elapsed_time(Duration::from_secs(120)), (" min".to_string(), 2.0));
    }

    #[test]
    fn test_timer_accumulates() {
        let mut timer = CustomTimer::new();
        timer.fun_tic();
        std::thread::sleep(Duration::from_millis(2));
        timer.fun_tac();
        assert!(timer.fun >= Duration::from_millis(2));
        assert!(timer.get_all().keys().any(|k| k.starts_with("time elapsed")));
    }
}
