use rgfx::Instance;

pub fn print(instance: &Instance) -> eyre::Result<()> {
    let backend = instance.backend();
    let extensions = rgfx::enumerate_instance_extensions(backend)?;
    let (major, minor, patch) = rgfx::get_version();
    println!("rgfx {major}.{minor}.{patch} on {}", backend.name());
    println!(
        "instance extensions: {}",
        extensions.iter().map(|e| e.name()).collect::<Vec<_>>().join(", ")
    );

    let adapters = instance.enumerate_adapters()?;
    if adapters.is_empty() {
        println!("no adapters");
    }
    for (index, adapter) in adapters.iter().enumerate() {
        let info = adapter.info();
        println!("[{index}] {} ({:?})", info.name, info.adapter_type);
        println!("    driver: {}", info.driver_description);
        println!("    ids: {:04x}:{:04x}", info.vendor_id, info.device_id);

        let limits = adapter.limits();
        println!("    max 2D texture: {}", limits.max_texture_dimension_2d);
        println!("    max buffer: {} bytes", limits.max_buffer_size);
        println!(
            "    alignment: uniform {} storage {}",
            limits.min_uniform_buffer_offset_alignment,
            limits.min_storage_buffer_offset_alignment
        );
        for (family, props) in adapter.queue_families().iter().enumerate() {
            println!(
                "    queue family {family}: {} x {:?}",
                props.queue_count, props.flags
            );
        }
        println!("    extensions: {}", adapter.extensions().join(", "));
    }
    Ok(())
}
