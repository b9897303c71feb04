//! `list` and `describe`: browse the cell registry.

use qcell_core::cell::{CellDescriptor, SocketSpec};
use qcell_core::registry;

use crate::colors;

/// Print every cell, grouped by category.
pub fn list(category: Option<&str>) -> anyhow::Result<()> {
    let categories = match category {
        Some(category) => {
            if !registry::categories().contains(&category) {
                anyhow::bail!(
                    "unknown category `{}` (known: {})",
                    category,
                    registry::categories().join(", ")
                );
            }
            vec![category]
        }
        None => registry::categories(),
    };

    for category in categories {
        println!("{}{}{}", colors::BOLD, category, colors::RESET);
        for descriptor in registry::in_category(category) {
            println!(
                "  {}{:<16}{} {}",
                colors::CYAN,
                descriptor.name,
                colors::RESET,
                descriptor.summary
            );
        }
    }
    Ok(())
}

/// Print the sockets and flows of one cell.
pub fn describe(name: &str) -> anyhow::Result<()> {
    let descriptor = registry::lookup(name)?;
    print_descriptor(descriptor);
    Ok(())
}

fn print_descriptor(d: &CellDescriptor) {
    println!("{}{}{} - {}", colors::BOLD, d.name, colors::RESET, d.summary);
    println!("{}categories:{} {}", colors::DIM, colors::RESET, d.categories.join(", "));

    print_sockets("inputs", d.inputs);
    print_sockets("outputs", d.outputs);
    if !d.inflows.is_empty() {
        println!("inflows: {}", d.inflows.join(", "));
    }
    if !d.outflows.is_empty() {
        let names: Vec<_> = d.outflows.iter().map(|f| f.name).collect();
        println!("outflows: {}", names.join(", "));
    }

    let mut flags = Vec::new();
    if d.always_reprocess {
        flags.push("always reprocess");
    }
    if d.threadsafe {
        flags.push("threadsafe");
    }
    if !flags.is_empty() {
        println!("{}{}{}", colors::DIM, flags.join(", "), colors::RESET);
    }
}

fn print_sockets(title: &str, sockets: &[SocketSpec]) {
    if sockets.is_empty() {
        return;
    }
    println!("{title}:");
    for spec in sockets {
        let initial = spec.initial.to_value();
        let mut line = format!("  {:<14} {}", spec.name, spec.ty);
        if !initial.is_null() {
            line.push_str(&format!(" = {initial}"));
        }
        if spec.required {
            line.push_str(&format!(" {}(required){}", colors::YELLOW, colors::RESET));
        }
        println!("{line}");
    }
}
