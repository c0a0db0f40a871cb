use colored::Colorize;
use regionflow_cloud_tencent::KNOWN_REGIONS;

pub fn handle() {
    println!("{}", "Known regions:".bold());
    for region in KNOWN_REGIONS {
        println!("  • {}", region.cyan());
    }
}
