use crate::pipeline::batch::BatchReport;
use crate::pipeline::types::AlignmentResult;
use std::path::Path;

pub fn print_result(result: &AlignmentResult) {
    println!("=== Alignment Result ===");
    println!("Method: {}", result.method);
    println!("Status: {}", result.status);
    println!("Fully aligned: {}", result.fully_aligned);
    match result.accepted_rotation_angle {
        Some(angle) => println!("Rotation: {:.1}°", angle),
        None => println!("Rotation: n/a"),
    }
    println!("Matched points: {}", result.matched_points);
    if let Some(reason) = &result.failure_reason {
        println!("Reason: {}", reason);
    }
    print_path("Matches", result.matches_image_path.as_deref());
    print_path("Aligned", result.aligned_image_path.as_deref());
    print_path("Overlaid", result.overlaid_image_path.as_deref());
    println!("Processing Time: {:.2}ms", result.execution_time_ms);

    if !result.rotation_attempts.is_empty() {
        println!();
        println!("| Angle (°) | Marks |");
        println!("|-----------|-------|");
        for attempt in &result.rotation_attempts {
            let marker = if Some(attempt.rotation_angle) == result.accepted_rotation_angle {
                " *"
            } else {
                ""
            };
            println!(
                "| {:>9.1} | {:>5} |{}",
                attempt.rotation_angle,
                attempt.marks_found.len(),
                marker
            );
        }
    }
}

pub fn print_batch_summary(report: &BatchReport) {
    println!("=== Batch Summary ===");
    println!("Generated: {}", report.generated_at.to_rfc3339());
    println!("Reference: {} ({})", report.reference, report.method);
    println!(
        "Documents: {} | success: {} | warning: {} | failed: {} | errors: {}",
        report.summary.total,
        report.summary.succeeded,
        report.summary.partial,
        report.summary.failed,
        report.summary.errored
    );
    println!();
    println!("| Document | Status | Rotation (°) | Points | Time (ms) |");
    println!("|----------|--------|--------------|--------|-----------|");

    for outcome in &report.outcomes {
        match (&outcome.result, &outcome.error) {
            (Some(result), _) => println!(
                "| {} | {} | {} | {} | {:.2} |",
                outcome.document_id,
                result.status,
                result
                    .accepted_rotation_angle
                    .map(|a| format!("{:.1}", a))
                    .unwrap_or_else(|| "-".to_string()),
                result.matched_points,
                result.execution_time_ms
            ),
            (None, error) => println!(
                "| {} | error | - | - | - | {}",
                outcome.document_id,
                error.as_deref().unwrap_or("unknown error")
            ),
        }
    }
}

fn print_path(label: &str, path: Option<&Path>) {
    if let Some(path) = path {
        println!("{}: {}", label, path.display());
    }
}
