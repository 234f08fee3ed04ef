use cortexd_common::types::{Alert, AlertType};

/// Build the analysis prompt for one raised alert.
///
/// Each alert type gets a prompt tailored to its context so the model
/// produces actionable advice instead of a generic restatement.
pub fn enrichment_prompt(alert: &Alert) -> String {
    let context = format_context(alert);

    let instructions = match alert.alert_type {
        AlertType::DiskUsage => {
            "Suggest the three most likely places to reclaim disk space on a \
             Linux server and the commands to investigate each."
        }
        AlertType::MemoryUsage => {
            "Identify the most common causes of sustained high memory usage on \
             a Linux server and how to find the offending processes."
        }
        AlertType::CpuUsage => {
            "Explain how to identify which processes are consuming CPU and \
             whether this load pattern is likely a runaway process."
        }
        AlertType::SecurityUpdate => {
            "Advise on how urgently these security updates should be applied \
             and what precautions to take before upgrading."
        }
        AlertType::CveFound => {
            "Assess the practical exposure of this vulnerability on a typical \
             server and recommend mitigation steps until a fix is installed."
        }
        AlertType::AiAnalysis | AlertType::System => {
            "Summarize the likely root cause and recommend a next step."
        }
    };

    format!(
        "You are a Linux system administration assistant. A monitoring alert \
         was raised on this host.\n\n{context}\n{instructions}\n\
         Respond in at most three short sentences."
    )
}

fn format_context(alert: &Alert) -> String {
    let mut context = format!(
        "Alert: {}\nSeverity: {}\nDetails: {}\n",
        alert.title, alert.severity, alert.message
    );
    for (key, value) in &alert.metadata {
        context.push_str(&format!("{key}: {value}\n"));
    }
    context
}

#[cfg(test)]
mod tests {
    use super::*;
    use cortexd_common::types::Severity;
    use std::collections::BTreeMap;

    #[test]
    fn prompt_includes_alert_context() {
        let mut metadata = BTreeMap::new();
        metadata.insert("usage_percent".to_string(), "95".to_string());
        let alert = Alert::new(
            Severity::Critical,
            AlertType::DiskUsage,
            "Critical disk usage",
            "Disk usage is at 95% on root filesystem",
            metadata,
        );

        let prompt = enrichment_prompt(&alert);
        assert!(prompt.contains("Critical disk usage"));
        assert!(prompt.contains("usage_percent: 95"));
        assert!(prompt.contains("disk space"));
    }

    #[test]
    fn prompts_differ_by_alert_type() {
        let disk = Alert::new(
            Severity::Warning,
            AlertType::DiskUsage,
            "t",
            "m",
            BTreeMap::new(),
        );
        let mem = Alert::new(
            Severity::Warning,
            AlertType::MemoryUsage,
            "t",
            "m",
            BTreeMap::new(),
        );
        assert_ne!(enrichment_prompt(&disk), enrichment_prompt(&mem));
    }
}
