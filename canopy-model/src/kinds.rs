//! Well-known fetcher names and resource types.

pub const FILE_SYSTEM: &str = "file-system";

pub const AWS_EC2: &str = "aws-ec2";
pub const AWS_S3: &str = "aws-s3";

/// Resource categories reported in [`ResourceMetadata::type_`](crate::ResourceMetadata).
pub mod category {
    pub const CLOUD_STORAGE: &str = "cloud-storage";
    pub const FILE: &str = "file";
}
