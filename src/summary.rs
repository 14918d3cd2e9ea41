use std::io;
use std::io::Write;

use method_table::InstalledCode;

pub fn write_installed(out: &mut impl Write, code: &InstalledCode) -> io::Result<()> {
    writeln!(out, "{} installed at {:#x} ({} bytes, frame {})", code.name, code.address(), code.code.blob_size(), code.total_frame_size)?;
    for (kind, offset) in code.code_offsets.iter() {
        writeln!(out, "  {} +{}", kind, offset)?;
    }
    for relocation in code.code.relocations() {
        writeln!(out, "  reloc +{} {} {}", relocation.offset, relocation.kind, relocation.format)?;
    }
    for (pc_offset, oop_map) in code.oop_maps.iter() {
        writeln!(out, "  oop map +{} {}", pc_offset, oop_map)?;
    }
    for pc_desc in code.pcs.iter() {
        writeln!(out, "  pc +{}", pc_desc.pc_offset)?;
        for scope in pc_desc.scopes() {
            writeln!(out, "    {}", scope)?;
        }
    }
    for dependency in code.dependencies.iter() {
        writeln!(out, "  depends on {}", dependency)?;
    }
    Ok(())
}
