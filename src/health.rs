use crate::state::AppState;
use actix_web::{web, HttpResponse};
use serde_json::json;
use std::process;

/// Root endpoint: service identity and the websocket entry point.
pub async fn index(state: web::Data<AppState>) -> HttpResponse {
    let config = state.get_config();

    HttpResponse::Ok().json(json!({
        "service": "ptt-asr-backend",
        "version": env!("CARGO_PKG_VERSION"),
        "websocket_endpoint": "/ws/asr",
        "model": config.model.name,
        "sample_rate": config.audio.sample_rate
    }))
}

pub async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    let config = state.get_config();
    let active = state.registry.len();
    let max = state.registry.max_connections();

    HttpResponse::Ok().json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": state.uptime_seconds(),
        "service": {
            "name": "ptt-asr-backend",
            "version": env!("CARGO_PKG_VERSION"),
            "host": config.server.host,
            "port": config.server.port
        },
        "connections": {
            "active": active,
            "max": max
        },
        "model": {
            "name": config.model.name,
            "revision": config.model.revision,
            "device": config.model.device
        },
        "memory": get_memory_info(),
        "system": get_system_status(active, max)
    }))
}

pub async fn connection_stats(state: web::Data<AppState>) -> HttpResponse {
    let config = state.get_config();
    let active = state.registry.len();
    let max = state.registry.max_connections();

    HttpResponse::Ok().json(json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": state.uptime_seconds(),
        "connections": {
            "active": active,
            "max": max,
            "available": max.saturating_sub(active)
        },
        "limits": {
            "max_audio_size_bytes": config.websocket.max_audio_size,
            "idle_timeout_seconds": config.websocket.idle_timeout_secs,
            "inference_queue_depth": config.websocket.inference_queue_depth
        },
        "audio": {
            "sample_rate": config.audio.sample_rate
        }
    }))
}

fn get_memory_info() -> serde_json::Value {
    let pid = process::id();

    #[cfg(target_os = "linux")]
    {
        if let Ok(status) = std::fs::read_to_string(format!("/proc/{}/status", pid)) {
            let mut vm_rss = 0;
            let mut vm_size = 0;

            for line in status.lines() {
                if line.starts_with("VmRSS:") {
                    if let Some(kb_str) = line.split_whitespace().nth(1) {
                        vm_rss = kb_str.parse::<u64>().unwrap_or(0) * 1024;
                    }
                } else if line.starts_with("VmSize:") {
                    if let Some(kb_str) = line.split_whitespace().nth(1) {
                        vm_size = kb_str.parse::<u64>().unwrap_or(0) * 1024;
                    }
                }
            }

            return json!({
                "resident_memory_bytes": vm_rss,
                "virtual_memory_bytes": vm_size,
                "available": true
            });
        }
    }

    json!({
        "resident_memory_bytes": 0,
        "virtual_memory_bytes": 0,
        "available": false
    })
}

fn get_system_status(active: usize, max: usize) -> serde_json::Value {
    let usage = if max > 0 {
        active as f64 / max as f64
    } else {
        0.0
    };

    let status = if usage > 0.9 {
        "high_load"
    } else if usage > 0.7 {
        "moderate_load"
    } else {
        "normal"
    };

    json!({
        "status": status,
        "connection_usage_percent": (usage * 100.0).round(),
        "max_connections": max,
        "active_connections": active
    })
}
