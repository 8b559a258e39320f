//! Terminal report rendering.
//!
//! Sections are rendered into a string first so the whole report can be
//! checked in tests and written to stdout in one go.

use colored::{Color, Colorize};
use tabled::settings::Style;
use tabled::{Table, Tabled};

use super::format;
use super::severity::{self, Severity};
use crate::scan::cluster::{ClusterSummary, HostUsage};
use crate::scan::image::ImageShape;
use crate::scan::namespace::NamespaceSummary;
use crate::scan::node::{CapacityType, NodeAnnotation, NodeWarning};

/// Pool-tag colours in 24-bit mode, by first-seen order.
const POOL_PALETTE: &[(u8, u8, u8)] = &[
    (204, 0, 0),
    (78, 154, 6),
    (196, 160, 0),
    (114, 159, 207),
    (117, 80, 123),
    (6, 152, 154),
    (230, 230, 230),
];

/// Pool-tag colours without 24-bit support.
const POOL_BASIC_PALETTE: &[Color] = &[
    Color::Red,
    Color::Green,
    Color::Yellow,
    Color::Blue,
    Color::Magenta,
    Color::Cyan,
    Color::White,
];

/// Zone colours, indexed by the zone's trailing letter.
const ZONE_PALETTE: &[Color] = &[
    Color::Yellow,
    Color::Blue,
    Color::Magenta,
    Color::Cyan,
    Color::White,
];

/// Which report sections to render.
#[derive(Debug, Clone)]
pub struct ReportOptions {
    pub pods: bool,
    pub images: bool,
    pub nodes: bool,
    pub deprecations: bool,
    pub true_color: bool,
    pub restart_limit: i32,
}

#[derive(Tabled)]
struct PodRow {
    #[tabled(rename = "PHASE")]
    phase: String,
    #[tabled(rename = "POD")]
    pod: String,
    #[tabled(rename = "WORKLOAD")]
    workload: String,
    #[tabled(rename = "CPU")]
    cpu: String,
    #[tabled(rename = "MEMORY")]
    memory: String,
    #[tabled(rename = "RESTARTS")]
    restarts: String,
    #[tabled(rename = "AGE")]
    age: String,
}

#[derive(Tabled)]
struct WorkloadRow {
    #[tabled(rename = "PODS")]
    pods: usize,
    #[tabled(rename = "WORKLOAD")]
    name: String,
    #[tabled(rename = "KIND")]
    kind: String,
    #[tabled(rename = "CPU")]
    cpu: String,
    #[tabled(rename = "MEMORY")]
    memory: String,
}

#[derive(Tabled)]
struct ImageRow {
    #[tabled(rename = "COUNT")]
    count: usize,
    #[tabled(rename = "REPOSITORY")]
    repository: String,
    #[tabled(rename = "IMAGE")]
    name: String,
    #[tabled(rename = "VERSION")]
    version: String,
}

#[derive(Tabled)]
struct InstanceTypeRow {
    #[tabled(rename = "NODES")]
    count: usize,
    #[tabled(rename = "INSTANCE TYPE")]
    shape: String,
    #[tabled(rename = "VCPU")]
    cpu: String,
    #[tabled(rename = "MEMORY")]
    memory: String,
    #[tabled(rename = "STORAGE")]
    storage: String,
    #[tabled(rename = "POOLS")]
    pools: String,
}

/// Print the report for one cluster to stdout.
pub fn print_report(summary: &ClusterSummary, options: &ReportOptions) {
    print!("{}", render(summary, options));
}

/// Render every enabled section.
pub fn render(summary: &ClusterSummary, options: &ReportOptions) -> String {
    let mut out = String::new();

    out.push_str(&format!(
        "{} {} ({}): {} namespaces, {} pods\n",
        "Cluster".bold(),
        summary.context.bold(),
        if summary.server_version.is_empty() {
            "unknown version"
        } else {
            summary.server_version.as_str()
        },
        summary.namespaces.len(),
        summary.pod_count()
    ));

    if options.pods {
        for namespace in summary.namespaces.values() {
            if !namespace.pods.is_empty()
                || namespace.has_deprecations()
                || namespace.stuck_helm_releases().next().is_some()
            {
                out.push_str(&namespace_detail(summary, namespace, options.restart_limit));
            }
        }
    }

    out.push_str(&empty_namespaces(summary));
    out.push_str(&pod_status(summary));
    out.push_str(&workload_breakdown(summary));

    if options.images {
        out.push_str(&image_breakdown(summary));
    }
    if options.nodes {
        out.push_str(&instance_type_breakdown(summary));
        out.push_str(&node_breakdown(summary, options.true_color));
    }
    if options.deprecations {
        out.push_str(&deprecation_digest(summary));
    }
    out.push_str(&degraded_warnings(summary));

    out
}

fn section_title(title: &str, tier: Severity) -> String {
    format!(
        "\n{} {} {}\n",
        "=====".dimmed(),
        tier.paint(title),
        "=====".dimmed()
    )
}

fn namespace_detail(
    summary: &ClusterSummary,
    namespace: &NamespaceSummary,
    restart_limit: i32,
) -> String {
    // Kinds that failed to list are shown as unknown rather than zero.
    let count = |kind: &str, n: usize| {
        if summary.is_degraded(kind) {
            "?".to_string()
        } else {
            n.to_string()
        }
    };
    let mut out = format!(
        "\n Namespace {} has {} vs, {} cm, {} secrets, {} ingresses, {} cronjobs and {} pods using {} images with requests of {}m CPU & {} MB RAM\n",
        namespace.name.bold(),
        count("virtualservices", namespace.virtual_services.len()),
        count("configmaps", namespace.config_maps.len()),
        count("secrets", namespace.secrets.len()),
        count("ingresses", namespace.ingresses.len()),
        count("cronjobs", namespace.cron_jobs.len()),
        namespace.pods.len(),
        namespace.images.len(),
        namespace.cpu_milli,
        format::mib(namespace.memory_bytes)
    );

    for secret in namespace.stuck_helm_releases() {
        out.push_str(&format!(
            "{}\n",
            Severity::Error.paint(&format!(
                "Stuck Helm release secret {}: {}",
                secret.name,
                secret.helm_status.as_deref().unwrap_or_default()
            ))
        ));
    }

    if namespace.has_deprecations() {
        for deprecation in &namespace.deprecations {
            out.push_str(&format!(
                "{}\n",
                Severity::Error.paint(&format!(
                    "Deprecated {} {} ({})",
                    deprecation.kind, deprecation.name, deprecation.api_version
                ))
            ));
        }
    }

    if namespace.pods.is_empty() {
        return out;
    }

    let rows: Vec<PodRow> = namespace
        .pods
        .iter()
        .map(|pod| {
            let phase = if pod.crash_looping {
                "CrashLoopBackOff"
            } else {
                pod.phase.as_str()
            };
            let requests = severity::pod_requests(pod.cpu_milli, pod.memory_bytes);
            PodRow {
                phase: severity::pod_phase(&pod.phase, pod.crash_looping)
                    .paint(phase)
                    .to_string(),
                pod: pod.name.clone(),
                workload: if pod.owner.is_resolved() {
                    pod.owner.name.clone()
                } else {
                    Severity::Warning.paint(&pod.owner.name).to_string()
                },
                cpu: requests.paint(&format!("{}m", pod.cpu_milli)).to_string(),
                memory: requests
                    .paint(&format!("{}Mi", format::mib(pod.memory_bytes)))
                    .to_string(),
                restarts: severity::restarts(pod.restart_count, restart_limit)
                    .paint(&pod.restart_count.to_string())
                    .to_string(),
                age: format::age(pod.running_seconds),
            }
        })
        .collect();

    let mut table = Table::new(&rows);
    apply_table_style(&mut table);
    out.push_str(&format!("{}\n", table));

    for pod in namespace
        .pods
        .iter()
        .filter(|p| severity::restarts(p.restart_count, restart_limit) != Severity::Good)
    {
        out.push_str(&format!(
            "{}\n",
            Severity::Warning.paint(&format!(
                "  {} restarted {} times, running for {}",
                pod.name,
                pod.restart_count,
                format::age(pod.running_seconds)
            ))
        ));
    }

    out
}

fn empty_namespaces(summary: &ClusterSummary) -> String {
    let unverified = summary.unverified_emptiness_kinds();
    let qualifier = if unverified.is_empty() {
        String::new()
    } else {
        format!(" ({} unavailable)", unverified.join(", "))
    };
    let mut out = format!(
        "\n - There are {} namespaces, {} of which are empty{}:\n",
        summary.namespaces.len(),
        summary.empty_namespaces.len(),
        qualifier
    );
    for name in &summary.empty_namespaces {
        out.push_str(&format!("   · {}\n", Severity::Warning.paint(name)));
    }
    out
}

fn pod_status(summary: &ClusterSummary) -> String {
    let status = &summary.status;
    let overall = severity::histogram(status);
    let bucket = |count: usize, tier: Severity| {
        Severity::when_nonzero(count, tier)
            .paint(&count.to_string())
            .to_string()
    };
    format!(
        "\n - Pod Status Breakdown ({} pods): {} Running - {} Pending - {} Failed - {} CrashLoopBackOff - {} Completed - {} Other\n",
        status.total(),
        status.running,
        bucket(status.pending, Severity::Error),
        bucket(status.failed, Severity::Error),
        bucket(status.crash_looping, Severity::Error),
        status.completed,
        bucket(status.other, overall.max(Severity::Warning)),
    )
}

fn workload_breakdown(summary: &ClusterSummary) -> String {
    let mut out = section_title("Workload Breakdown", Severity::Good);
    if summary.workloads.is_empty() {
        out.push_str("No workloads found.\n");
        return out;
    }

    let rows: Vec<WorkloadRow> = summary
        .workloads
        .values()
        .map(|w| WorkloadRow {
            pods: w.pods,
            name: w.name.clone(),
            kind: w.kind.to_string(),
            cpu: format!("{} vCPU", format::cores(w.cpu_milli)),
            memory: format!("{} GiB", format::gib(w.memory_bytes)),
        })
        .collect();

    let mut table = Table::new(&rows);
    apply_table_style(&mut table);
    out.push_str(&format!("{}\n", table));
    out
}

fn image_breakdown(summary: &ClusterSummary) -> String {
    let mut out = section_title("Image Breakdown", Severity::Good);

    let (parsed, unparsed): (Vec<_>, Vec<_>) = summary
        .images
        .values()
        .partition(|img| img.image.is_parsed());

    if !parsed.is_empty() {
        let rows: Vec<ImageRow> = parsed
            .iter()
            .map(|img| ImageRow {
                count: img.count,
                repository: img.image.repository.clone(),
                name: img.image.name.clone(),
                version: match img.image.shape {
                    ImageShape::ImpliedLatest => format!("{} (implied)", img.image.version),
                    _ => img.image.version.clone(),
                },
            })
            .collect();
        let mut table = Table::new(&rows);
        apply_table_style(&mut table);
        out.push_str(&format!("{}\n", table));
    }

    if !unparsed.is_empty() {
        out.push_str(&format!(
            "{}\n",
            Severity::Warning.paint("Unrecognised image references:")
        ));
        for img in unparsed {
            out.push_str(&format!("  {:>4} x {}\n", img.count, img.reference));
        }
    }
    out
}

fn instance_type_breakdown(summary: &ClusterSummary) -> String {
    let mut out = section_title("Instance Type Breakdown", Severity::Good);
    let groups = &summary.nodes.groups;
    if groups.is_empty() {
        out.push_str("No nodes found.\n");
        return out;
    }

    let rows: Vec<InstanceTypeRow> = groups
        .iter()
        .map(|g| InstanceTypeRow {
            count: g.count,
            shape: g.shape.clone(),
            cpu: format::cores(g.cpu_milli),
            memory: format!("{} GiB", format::gib(g.memory_bytes)),
            storage: format!("{} GiB", format::gib(g.storage_bytes)),
            pools: g.pools.join(","),
        })
        .collect();
    let mut table = Table::new(&rows);
    apply_table_style(&mut table);
    out.push_str(&format!("{}\n", table));
    out
}

fn node_breakdown(summary: &ClusterSummary, true_color: bool) -> String {
    let mut out = section_title("Node Breakdown", Severity::Good);
    let totals = &summary.nodes.totals;

    let capacity = format!(
        " There are {} nodes, using {} volumes in the cluster with a total of {}/{} cores and {}/{} GiB of RAM requested",
        totals.nodes,
        totals.volumes,
        format::cores(summary.cpu_milli),
        format::cores(totals.cpu_milli),
        format::gib(summary.memory_bytes),
        format::gib(totals.memory_bytes)
    );
    out.push_str(&format!("{}\n{}\n", capacity, "-".repeat(capacity.len())));

    if !summary.nodes.pools.is_empty() {
        let legend: Vec<String> = summary
            .nodes
            .pools
            .iter()
            .enumerate()
            .map(|(i, pool)| pool_paint(&format!("⬤ {}", pool), Some(i), true_color))
            .collect();
        out.push_str(&format!("     {}\n", legend.join("  ")));
    }
    out.push('\n');

    for node in &summary.nodes.nodes {
        let usage = node
            .internal_ip
            .as_ref()
            .and_then(|ip| summary.hosts.get(ip))
            .copied()
            .unwrap_or_default();
        out.push_str(&node_line(node, &usage, true_color));
        for taint in &node.other_taints {
            out.push_str(&format!(
                "{}\n",
                format!(
                    "    | Taint {} => {} ({})",
                    taint.key,
                    taint.value.as_deref().unwrap_or_default(),
                    taint.effect
                )
                .dimmed()
            ));
        }
    }
    out
}

fn node_line(node: &NodeAnnotation, usage: &HostUsage, true_color: bool) -> String {
    let warnings: String = node.warnings.iter().map(|w| warning_mark(*w)).collect();
    let host = node.host_name.as_deref().unwrap_or(&node.name);
    let capacity_type = match node.capacity_type {
        Some(CapacityType::OnDemand) => "ON_DEMAND".bold().to_string(),
        Some(CapacityType::Spot) => "SPOT".to_string(),
        None => "-".to_string(),
    };
    let zone = match (node.zone.as_deref(), node.zone_slot()) {
        (Some(zone), Some(slot)) => zone.color(ZONE_PALETTE[slot % ZONE_PALETTE.len()]).to_string(),
        (Some(zone), None) => zone.to_string(),
        (None, _) => "-".to_string(),
    };

    format!(
        "{:>6} {:>8} {:>5} old {} is {:>9} in {:>10} & {} taints - {:>4} CPUs {:>3} Gi ({}) {}, {} labels {} vols. {:>3} pods w/req: {} vCPU, {} GiB mem\n",
        severity::node(node).paint(&warnings),
        node.pool,
        format::age(node.age_seconds),
        pool_paint(host, node.pool_index, true_color),
        capacity_type,
        zone,
        node.taint_count,
        format::cores(node.cpu_milli),
        format::gib(node.memory_bytes),
        node.shape,
        node.internal_ip.as_deref().unwrap_or("-"),
        node.label_count,
        node.volume_count,
        usage.pods,
        format::cores(usage.cpu_milli),
        format::gib(usage.memory_bytes)
    )
}

fn warning_mark(warning: NodeWarning) -> &'static str {
    match warning {
        NodeWarning::Unschedulable => "🚫",
        NodeWarning::ScaleDownCandidate => "🗑",
        NodeWarning::PendingDeletion => "⌛",
        NodeWarning::NotReady => "✨",
        NodeWarning::DiskPressure => "💾",
    }
}

fn pool_paint(text: &str, pool_index: Option<usize>, true_color: bool) -> String {
    let Some(i) = pool_index else {
        return text.to_string();
    };
    if true_color {
        let (r, g, b) = POOL_PALETTE[i % POOL_PALETTE.len()];
        text.truecolor(r, g, b).to_string()
    } else {
        text.color(POOL_BASIC_PALETTE[i % POOL_BASIC_PALETTE.len()])
            .to_string()
    }
}

fn deprecation_digest(summary: &ClusterSummary) -> String {
    let lines: Vec<String> = summary.deprecations().map(|d| d.describe()).collect();
    if lines.is_empty() {
        return String::new();
    }
    let mut out = section_title("Deprecations/Warnings", Severity::Error);
    for line in lines {
        out.push_str(&format!("{}\n", line));
    }
    out
}

fn degraded_warnings(summary: &ClusterSummary) -> String {
    if summary.degraded.is_empty() {
        return String::new();
    }
    let mut out = section_title("Incomplete Data", Severity::Warning);
    for d in &summary.degraded {
        out.push_str(&format!(
            "{}\n",
            Severity::Warning.paint(&format!("{} could not be listed: {}", d.kind, d.reason))
        ));
    }
    out
}

fn apply_table_style(table: &mut Table) {
    use tabled::settings::object::Columns;
    use tabled::settings::themes::Theme;
    use tabled::settings::{Modify, Padding};

    let mut theme = Theme::from_style(Style::empty());
    theme.remove_horizontal_lines();
    table.with(theme);
    table.with(Modify::new(Columns::new(..)).with(Padding::new(0, 2, 0, 0)));
}
