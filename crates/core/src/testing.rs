use crate::{BusinessRef, Program, ProgramStatus};

/// Active `cpc` program with a numbered id (`p-<n>`).
pub fn program(n: usize) -> Program {
    Program::new(format!("p-{n}"), ProgramStatus::Active, "cpc")
}

/// `count` programs numbered from `start`, in order.
pub fn programs(start: usize, count: usize) -> Vec<Program> {
    (start..start + count).map(program).collect()
}

/// Program referencing one business under the given aliases.
pub fn program_for_business(
    id: &str,
    status: ProgramStatus,
    program_type: &str,
    aliases: &[&str],
    name: Option<&str>,
) -> Program {
    Program::new(id, status, program_type).with_business(BusinessRef::new(aliases, name))
}
