//! Emit VERGEN_BUILD_DATE and VERGEN_GIT_SHA for the detailed health endpoint

use vergen::EmitBuilder;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Short SHA; outside a git checkout vergen emits a placeholder with a warning
    EmitBuilder::builder().build_date().git_sha(true).emit()?;

    Ok(())
}
