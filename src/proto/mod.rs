// Generated by tonic-build into OUT_DIR; see build.rs.

pub mod common {
    tonic::include_proto!("catalog.common");
}

pub mod auth {
    tonic::include_proto!("catalog.auth");
}

pub mod users {
    tonic::include_proto!("catalog.users");
}

pub mod inventory {
    tonic::include_proto!("catalog.inventory");
}

pub mod items {
    tonic::include_proto!("catalog.items");
}

pub mod discussion {
    tonic::include_proto!("catalog.discussion");
}

pub mod search {
    tonic::include_proto!("catalog.search");
}

pub mod health {
    tonic::include_proto!("grpc.health.v1");
}

pub const FILE_DESCRIPTOR_SET: &[u8] = tonic::include_file_descriptor_set!("inventory_descriptor");
