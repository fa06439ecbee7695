// Versioned schema for the `recon` namespace. Each entry runs in its own
// transaction inside `Store::migrate`; the tracking table records
// (namespace, version) pairs so re-running `migrate` is a no-op.

pub struct Migration {
    pub version: i64,
    pub sql: &'static str,
}

pub const NAMESPACE: &str = "recon";

pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        sql: r#"
        CREATE TABLE IF NOT EXISTS recon_devices (
            id TEXT PRIMARY KEY,
            mac_address TEXT UNIQUE,
            ip_addresses TEXT NOT NULL DEFAULT '[]',
            hostname TEXT,
            device_type TEXT NOT NULL DEFAULT 'unknown',
            classification_confidence INTEGER NOT NULL DEFAULT 0,
            classification_source TEXT NOT NULL DEFAULT 'none',
            classification_signals TEXT NOT NULL DEFAULT '[]',
            status TEXT NOT NULL DEFAULT 'unknown',
            first_seen TEXT NOT NULL,
            last_seen TEXT NOT NULL,
            discovery_method TEXT NOT NULL DEFAULT 'manual',
            agent_id TEXT,
            manufacturer TEXT,
            os TEXT,
            location TEXT,
            category TEXT,
            primary_role TEXT,
            owner TEXT,
            notes TEXT,
            tags TEXT NOT NULL DEFAULT '[]',
            custom_fields TEXT NOT NULL DEFAULT '{}',
            parent_device_id TEXT,
            network_layer INTEGER NOT NULL DEFAULT 0,
            connection_type TEXT NOT NULL DEFAULT 'unknown',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            FOREIGN KEY (parent_device_id) REFERENCES recon_devices(id) ON DELETE SET NULL
        );
        CREATE INDEX IF NOT EXISTS idx_recon_devices_status ON recon_devices(status);
        CREATE INDEX IF NOT EXISTS idx_recon_devices_last_seen ON recon_devices(last_seen);
        CREATE INDEX IF NOT EXISTS idx_recon_devices_category ON recon_devices(category);
        "#,
    },
    Migration {
        version: 2,
        sql: r#"
        CREATE TABLE IF NOT EXISTS recon_scans (
            id TEXT PRIMARY KEY,
            subnet TEXT NOT NULL,
            started_at TEXT NOT NULL,
            ended_at TEXT,
            status TEXT NOT NULL DEFAULT 'pending',
            total INTEGER NOT NULL DEFAULT 0,
            online INTEGER NOT NULL DEFAULT 0,
            error_msg TEXT
        );

        CREATE TABLE IF NOT EXISTS recon_scan_devices (
            scan_id TEXT NOT NULL REFERENCES recon_scans(id) ON DELETE CASCADE,
            device_id TEXT NOT NULL REFERENCES recon_devices(id) ON DELETE CASCADE,
            PRIMARY KEY (scan_id, device_id)
        );

        CREATE TABLE IF NOT EXISTS recon_scan_metrics (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            scan_id TEXT NOT NULL REFERENCES recon_scans(id) ON DELETE CASCADE,
            duration_ms INTEGER NOT NULL,
            ping_ms INTEGER NOT NULL,
            enrich_ms INTEGER NOT NULL,
            post_process_ms INTEGER NOT NULL,
            hosts_scanned INTEGER NOT NULL,
            hosts_alive INTEGER NOT NULL,
            devices_created INTEGER NOT NULL,
            devices_updated INTEGER NOT NULL,
            created_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_recon_scan_metrics_created_at ON recon_scan_metrics(created_at);

        CREATE TABLE IF NOT EXISTS recon_scan_metrics_aggregates (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            period TEXT NOT NULL,
            period_start TEXT NOT NULL,
            scan_count INTEGER NOT NULL,
            avg_duration_ms REAL NOT NULL,
            avg_hosts_scanned REAL NOT NULL,
            avg_hosts_alive REAL NOT NULL,
            max_devices_found INTEGER NOT NULL,
            min_devices_found INTEGER NOT NULL,
            failed_scans INTEGER NOT NULL,
            total_new_devices INTEGER NOT NULL,
            UNIQUE(period, period_start)
        );
        "#,
    },
    Migration {
        version: 3,
        sql: r#"
        CREATE TABLE IF NOT EXISTS recon_topology_links (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            source_device_id TEXT NOT NULL REFERENCES recon_devices(id) ON DELETE CASCADE,
            target_device_id TEXT NOT NULL REFERENCES recon_devices(id) ON DELETE CASCADE,
            link_type TEXT NOT NULL,
            last_confirmed TEXT NOT NULL,
            UNIQUE(source_device_id, target_device_id, link_type)
        );

        CREATE TABLE IF NOT EXISTS recon_topology_layouts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            device_id TEXT NOT NULL REFERENCES recon_devices(id) ON DELETE CASCADE,
            network_layer INTEGER NOT NULL,
            computed_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS recon_device_history (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            device_id TEXT NOT NULL REFERENCES recon_devices(id) ON DELETE CASCADE,
            old_status TEXT NOT NULL,
            new_status TEXT NOT NULL,
            changed_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_recon_device_history_device ON recon_device_history(device_id);

        CREATE TABLE IF NOT EXISTS recon_service_movements (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            port INTEGER NOT NULL,
            protocol TEXT NOT NULL,
            service_name TEXT NOT NULL,
            from_device_id TEXT NOT NULL REFERENCES recon_devices(id) ON DELETE CASCADE,
            to_device_id TEXT NOT NULL REFERENCES recon_devices(id) ON DELETE CASCADE,
            detected_at TEXT NOT NULL
        );
        "#,
    },
    Migration {
        version: 4,
        sql: r#"
        CREATE TABLE IF NOT EXISTS recon_device_hardware (
            device_id TEXT PRIMARY KEY REFERENCES recon_devices(id) ON DELETE CASCADE,
            hostname TEXT,
            os TEXT,
            kernel TEXT,
            cpu_model TEXT,
            cpu_cores INTEGER,
            total_memory_mb INTEGER,
            collection_source TEXT NOT NULL DEFAULT 'auto',
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS recon_device_storage (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            device_id TEXT NOT NULL REFERENCES recon_devices(id) ON DELETE CASCADE,
            name TEXT NOT NULL,
            storage_type TEXT NOT NULL DEFAULT 'Unknown',
            capacity_gb INTEGER,
            collection_source TEXT NOT NULL DEFAULT 'auto',
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS recon_device_gpu (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            device_id TEXT NOT NULL REFERENCES recon_devices(id) ON DELETE CASCADE,
            model TEXT NOT NULL,
            memory_mb INTEGER,
            collection_source TEXT NOT NULL DEFAULT 'auto',
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS recon_device_services (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            device_id TEXT NOT NULL REFERENCES recon_devices(id) ON DELETE CASCADE,
            port INTEGER NOT NULL,
            protocol TEXT NOT NULL DEFAULT 'tcp',
            service_name TEXT,
            collection_source TEXT NOT NULL DEFAULT 'auto',
            updated_at TEXT NOT NULL
        );
        "#,
    },
    Migration {
        version: 5,
        sql: r#"
        CREATE TABLE IF NOT EXISTS recon_proxmox_resources (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            device_id TEXT NOT NULL REFERENCES recon_devices(id) ON DELETE CASCADE,
            node TEXT NOT NULL,
            vmid INTEGER,
            resource_type TEXT NOT NULL,
            status TEXT,
            cpu_percent REAL,
            mem_mb INTEGER,
            disk_gb INTEGER,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS recon_wifi_clients (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            device_id TEXT REFERENCES recon_devices(id) ON DELETE CASCADE,
            client_mac TEXT NOT NULL,
            signal_dbm INTEGER,
            signal_avg_dbm INTEGER,
            connected_secs INTEGER,
            inactive_ms INTEGER,
            rx_bitrate_kbps INTEGER,
            tx_bitrate_kbps INTEGER,
            rx_bytes INTEGER,
            tx_bytes INTEGER,
            ap_bssid TEXT,
            ap_ssid TEXT,
            observed_at TEXT NOT NULL
        );
        "#,
    },
];
