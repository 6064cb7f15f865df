/// X (solve number) and Y (seconds) upper bounds for the trend chart
pub fn compute_chart_params(points: &[(f64, f64)]) -> (f64, f64) {
    let slowest = points.iter().map(|&(_, secs)| secs).fold(0.0, f64::max);
    let solves = (points.len() as f64).max(2.0);

    // headroom so the slowest point isn't drawn on the frame
    let y_max = if slowest > 0.0 {
        (slowest * 1.1).ceil()
    } else {
        1.0
    };

    (solves, y_max)
}

/// Format a simple numeric label consistently
pub fn format_label(val: f64) -> String {
    if (val - val.round()).abs() < f64::EPSILON {
        format!("{}", val.round())
    } else {
        format!("{val:.2}")
    }
}
