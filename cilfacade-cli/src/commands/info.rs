use std::path::Path;

use anyhow::Context;
use cilfacade::{facade::symbolmap::SymbolMap, metadata::typesystem::TypeRef};
use serde::Serialize;

use crate::{
    app::GlobalOptions,
    commands::common::load_module,
    output::{print_output, Align, TabWriter},
};

#[derive(Debug, Serialize)]
struct ModuleInfo {
    name: String,
    version: String,
    references: Vec<String>,
    resources: usize,
    types: Vec<TypeEntry>,
}

#[derive(Debug, Serialize)]
struct TypeEntry {
    kind: &'static str,
    name: String,
    members: Vec<MemberEntry>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    symbols: Vec<SymbolEntry>,
}

#[derive(Debug, Serialize)]
struct MemberEntry {
    kind: &'static str,
    signature: String,
}

#[derive(Debug, Serialize)]
struct SymbolEntry {
    name: String,
    original: String,
}

fn kind_of(def: &cilfacade::metadata::members::TypeDef) -> &'static str {
    if def.is_interface() {
        "interface"
    } else if def.is_static_class() {
        "static class"
    } else if def.is_value_type() {
        "struct"
    } else {
        "class"
    }
}

fn decode_maps(
    module: &cilfacade::CilModule,
    type_ref: &TypeRef,
) -> anyhow::Result<Vec<SymbolEntry>> {
    let full_name = type_ref.full_name();
    let Some(map) = SymbolMap::load(module, &full_name)
        .with_context(|| format!("failed to decode the symbol maps of {full_name}"))?
    else {
        return Ok(Vec::new());
    };

    let fields = map.fields.iter().map(|(name, field)| SymbolEntry {
        name: name.to_string(),
        original: field.to_string(),
    });
    let methods = map.methods.iter().map(|(name, method)| SymbolEntry {
        name: name.to_string(),
        original: method.to_string(),
    });
    Ok(fields.chain(methods).collect())
}

pub fn run(path: &Path, maps: bool, opts: &GlobalOptions) -> anyhow::Result<()> {
    let module = load_module(path)?;

    let mut types = Vec::new();
    let mut failure = None;
    module.walk_types(|type_ref, def| {
        if failure.is_some() {
            return;
        }

        let mut members = Vec::new();
        for field in &def.fields {
            members.push(MemberEntry {
                kind: "field",
                signature: format!("{} {}", field.field_type, field.name),
            });
        }
        for property in &def.properties {
            members.push(MemberEntry {
                kind: "property",
                signature: format!("{} {}", property.property_type, property.name),
            });
        }
        for method in &def.methods {
            members.push(MemberEntry {
                kind: "method",
                signature: method.full_name(type_ref),
            });
        }

        let symbols = if maps {
            match decode_maps(&module, type_ref) {
                Ok(symbols) => symbols,
                Err(error) => {
                    failure = Some(error);
                    Vec::new()
                }
            }
        } else {
            Vec::new()
        };

        types.push(TypeEntry {
            kind: kind_of(def),
            name: type_ref.full_name(),
            members,
            symbols,
        });
    });
    if let Some(error) = failure {
        return Err(error);
    }

    let info = ModuleInfo {
        name: module.name.clone(),
        version: module.version.to_string(),
        references: module
            .assembly_refs
            .iter()
            .map(|assembly_ref| format!("{} {}", assembly_ref.name, assembly_ref.version))
            .collect(),
        resources: module.resources.len(),
        types,
    };

    print_output(&info, opts, |info| {
        println!("{} {}", info.name, info.version);
        for reference in &info.references {
            println!("  references {reference}");
        }
        println!("  {} types, {} resources", info.types.len(), info.resources);

        for entry in &info.types {
            println!();
            println!("{} {}", entry.kind, entry.name);

            let mut tw = TabWriter::new(&[("Kind", Align::Left), ("Member", Align::Left)]).indent("  ");
            for member in &entry.members {
                tw.row(vec![member.kind.to_string(), member.signature.clone()]);
            }
            if !entry.members.is_empty() {
                tw.print();
            }

            if !entry.symbols.is_empty() {
                let mut tw =
                    TabWriter::new(&[("Facade", Align::Right), ("Original", Align::Left)]).indent("  ");
                for symbol in &entry.symbols {
                    tw.row(vec![symbol.name.clone(), symbol.original.clone()]);
                }
                tw.print();
            }
        }
    })
}
