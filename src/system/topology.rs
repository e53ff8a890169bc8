//! CPU and NUMA topology discovery from `lscpu`

use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A NUMA node and the CPUs attached to it (memory-only nodes have none)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NumaNode {
    pub id: u32,
    pub cpus: Vec<u32>,
}

/// Processor layout as reported by `lscpu`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CpuTopology {
    pub model_name: String,
    pub sockets: u32,
    pub cores_per_socket: u32,
    pub threads_per_core: u32,
    pub numa_nodes: Vec<NumaNode>,
    pub flags: Vec<String>,
}

impl CpuTopology {
    /// Parse the default (human-readable) `lscpu` output
    pub fn from_lscpu(output: &str) -> Result<Self> {
        let mut fields: BTreeMap<String, String> = BTreeMap::new();
        let mut numa_nodes = Vec::new();

        for line in output.lines() {
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let key = key.trim();
            let value = value.trim();

            if let Some(id) = key
                .strip_prefix("NUMA node")
                .and_then(|rest| rest.strip_suffix(" CPU(s)"))
            {
                let id: u32 = id.trim().parse()
                    .map_err(|_| AppError::parse(format!("Bad NUMA node line in lscpu output: {}", line.trim())))?;
                numa_nodes.push(NumaNode { id, cpus: parse_cpu_list(value)? });
                continue;
            }

            fields.entry(key.to_string()).or_insert_with(|| value.to_string());
        }

        let number = |key: &str| -> Result<u32> {
            let raw = fields
                .get(key)
                .ok_or_else(|| AppError::parse(format!("lscpu output lacks '{}'", key)))?;
            raw.parse::<u32>()
                .map_err(|_| AppError::parse(format!("lscpu '{}' is not a number: {}", key, raw)))
        };

        let sockets = number("Socket(s)")?;
        let cores_per_socket = number("Core(s) per socket")?;
        let threads_per_core = number("Thread(s) per core")?;
        if sockets == 0 || cores_per_socket == 0 || threads_per_core == 0 {
            return Err(AppError::parse("lscpu reports a zero-sized topology"));
        }

        numa_nodes.sort_by_key(|n| n.id);

        Ok(Self {
            model_name: fields.get("Model name").cloned().unwrap_or_else(|| "unknown".to_string()),
            sockets,
            cores_per_socket,
            threads_per_core,
            numa_nodes,
            flags: fields
                .get("Flags")
                .map(|f| f.split_whitespace().map(str::to_string).collect())
                .unwrap_or_default(),
        })
    }

    pub fn total_cpus(&self) -> u32 {
        self.sockets * self.cores_per_socket * self.threads_per_core
    }

    pub fn avx512_supported(&self) -> bool {
        self.flags.iter().any(|f| f == "avx512f")
    }

    /// NUMA nodes that own CPUs, grouped per socket. Sub-NUMA clustering
    /// yields several nodes per socket; they are assumed to be numbered
    /// socket by socket.
    fn socket_nodes(&self, socket: u32) -> Option<Vec<&NumaNode>> {
        let cpu_nodes: Vec<&NumaNode> = self.numa_nodes.iter().filter(|n| !n.cpus.is_empty()).collect();
        if cpu_nodes.is_empty() || cpu_nodes.len() % self.sockets as usize != 0 {
            return None;
        }
        let per_socket = cpu_nodes.len() / self.sockets as usize;
        let start = socket as usize * per_socket;
        Some(cpu_nodes[start..start + per_socket].to_vec())
    }

    /// One CPU per physical core of `socket`, in ascending order.
    ///
    /// Linux numbers the first hardware thread of every core before any
    /// sibling thread, so the lowest `cores_per_socket` CPUs of the socket
    /// are its physical cores.
    pub fn socket_cores(&self, socket: u32) -> Result<Vec<u32>> {
        if socket >= self.sockets {
            return Err(AppError::validation(format!(
                "Socket {} does not exist (system has {} sockets)",
                socket, self.sockets
            )));
        }

        let cores = self.cores_per_socket as usize;
        let cpus: Vec<u32> = match self.socket_nodes(socket) {
            Some(nodes) => {
                let mut cpus: Vec<u32> = nodes.iter().flat_map(|n| n.cpus.iter().copied()).collect();
                cpus.sort_unstable();
                cpus.dedup();
                cpus
            }
            None => {
                let first = socket * self.cores_per_socket;
                (first..first + self.cores_per_socket).collect()
            }
        };

        if cpus.len() < cores {
            return Err(AppError::precondition(format!(
                "Socket {} has only {} online CPUs but {} cores are expected; are CPUs offline?",
                socket,
                cpus.len(),
                cores
            )));
        }

        Ok(cpus[..cores].to_vec())
    }
}

/// Parse a kernel CPU list such as `0-27,56-83` into sorted CPU ids
pub fn parse_cpu_list(list: &str) -> Result<Vec<u32>> {
    let mut cpus = Vec::new();

    for part in list.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        match part.split_once('-') {
            Some((lo, hi)) => {
                let lo: u32 = lo.trim().parse()
                    .map_err(|_| AppError::parse(format!("Invalid CPU range '{}'", part)))?;
                let hi: u32 = hi.trim().parse()
                    .map_err(|_| AppError::parse(format!("Invalid CPU range '{}'", part)))?;
                if lo > hi {
                    return Err(AppError::parse(format!("Descending CPU range '{}'", part)));
                }
                cpus.extend(lo..=hi);
            }
            None => {
                cpus.push(part.parse()
                    .map_err(|_| AppError::parse(format!("Invalid CPU id '{}'", part)))?);
            }
        }
    }

    cpus.sort_unstable();
    cpus.dedup();
    Ok(cpus)
}

/// Format CPU ids as a compact kernel-style list (`0-3,8,10-11`)
pub fn format_cpu_list(cpus: &[u32]) -> String {
    let mut sorted = cpus.to_vec();
    sorted.sort_unstable();
    sorted.dedup();

    let mut parts = Vec::new();
    let mut iter = sorted.into_iter().peekable();
    while let Some(start) = iter.next() {
        let mut end = start;
        while iter.peek() == Some(&(end + 1)) {
            end += 1;
            iter.next();
        }
        if start == end {
            parts.push(start.to_string());
        } else {
            parts.push(format!("{}-{}", start, end));
        }
    }
    parts.join(",")
}
