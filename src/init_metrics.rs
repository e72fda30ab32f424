pub(super) fn init_metrics() {
    describe_toplevel();
    describe_process();
    describe_repo();
    describe_middleware();
    describe_object_storage();
}

fn describe_toplevel() {
    metrics::describe_counter!(
        VIDEOS_CREATED,
        "How many video records have been created in tubely"
    );
    metrics::describe_counter!(
        VIDEOS_DELETED,
        "How many video records have been deleted from tubely"
    );
    metrics::describe_counter!(
        UPLOADS,
        "How many video files have been uploaded to tubely, by aspect ratio"
    );
    metrics::describe_counter!(
        UPLOADS_REJECTED,
        "How many video uploads tubely has refused, by reason"
    );
}

pub(crate) const VIDEOS_CREATED: &str = "tubely.videos.created";
pub(crate) const VIDEOS_DELETED: &str = "tubely.videos.deleted";
pub(crate) const UPLOADS: &str = "tubely.uploads";
pub(crate) const UPLOADS_REJECTED: &str = "tubely.uploads.rejected";

fn describe_process() {
    metrics::describe_counter!(
        PROCESS_START,
        "How many times tubely has spawned a background process"
    );
    metrics::describe_histogram!(
        PROCESS_DURATION,
        "Timings for how long background processes take to complete"
    );
    metrics::describe_counter!(PROCESS_END, "How many background processes have completed");
}

pub(crate) const PROCESS_START: &str = "tubely.process.start";
pub(crate) const PROCESS_DURATION: &str = "tubely.process.duration";
pub(crate) const PROCESS_END: &str = "tubely.process.end";

fn describe_repo() {
    metrics::describe_histogram!(
        SLED_VIDEOS_CREATE,
        "Timings for inserting a video record into sled"
    );
    metrics::describe_histogram!(
        SLED_VIDEOS_GET,
        "Timings for fetching a video record from sled"
    );
    metrics::describe_histogram!(
        SLED_VIDEOS_FOR_USER,
        "Timings for listing a user's video records from sled"
    );
    metrics::describe_histogram!(
        SLED_VIDEOS_UPDATE,
        "Timings for updating a video record in sled"
    );
    metrics::describe_histogram!(
        SLED_VIDEOS_DELETE,
        "Timings for deleting a video record from sled"
    );
    metrics::describe_counter!(
        POSTGRES_POOL_CONNECTION_CREATE,
        "How many connections to postgres have been made"
    );
    metrics::describe_counter!(
        POSTGRES_POOL_GET,
        "How many times a connection has been retrieved from the connection pool"
    );
    metrics::describe_histogram!(
        POSTGRES_POOL_GET_DURATION,
        "How long tubely spent waiting for postgres connections from the connection pool"
    );
    metrics::describe_histogram!(
        POSTGRES_VIDEOS_CREATE,
        "Timings for inserting a video record into postgres"
    );
    metrics::describe_histogram!(
        POSTGRES_VIDEOS_GET,
        "Timings for fetching a video record from postgres"
    );
    metrics::describe_histogram!(
        POSTGRES_VIDEOS_FOR_USER,
        "Timings for listing a user's video records from postgres"
    );
    metrics::describe_histogram!(
        POSTGRES_VIDEOS_UPDATE,
        "Timings for updating a video record in postgres"
    );
    metrics::describe_histogram!(
        POSTGRES_VIDEOS_DELETE,
        "Timings for deleting a video record from postgres"
    );
}

pub(crate) const SLED_VIDEOS_CREATE: &str = "tubely.sled.videos.create";
pub(crate) const SLED_VIDEOS_GET: &str = "tubely.sled.videos.get";
pub(crate) const SLED_VIDEOS_FOR_USER: &str = "tubely.sled.videos.for-user";
pub(crate) const SLED_VIDEOS_UPDATE: &str = "tubely.sled.videos.update";
pub(crate) const SLED_VIDEOS_DELETE: &str = "tubely.sled.videos.delete";
pub(crate) const POSTGRES_POOL_CONNECTION_CREATE: &str = "tubely.postgres.pool.connection.create";
pub(crate) const POSTGRES_POOL_GET: &str = "tubely.postgres.pool.get";
pub(crate) const POSTGRES_POOL_GET_DURATION: &str = "tubely.postgres.pool.duration";
pub(crate) const POSTGRES_VIDEOS_CREATE: &str = "tubely.postgres.videos.create";
pub(crate) const POSTGRES_VIDEOS_GET: &str = "tubely.postgres.videos.get";
pub(crate) const POSTGRES_VIDEOS_FOR_USER: &str = "tubely.postgres.videos.for-user";
pub(crate) const POSTGRES_VIDEOS_UPDATE: &str = "tubely.postgres.videos.update";
pub(crate) const POSTGRES_VIDEOS_DELETE: &str = "tubely.postgres.videos.delete";

fn describe_middleware() {
    metrics::describe_counter!(
        REQUEST_START,
        "How many requests have been made to tubely, by route"
    );
    metrics::describe_counter!(
        REQUEST_END,
        "How many requests tubely has finished serving, by route, status, and error code"
    );
    metrics::describe_histogram!(
        REQUEST_TIMINGS,
        "How long tubely takes to serve requests, by route and status"
    );
}

pub(crate) const REQUEST_START: &str = "tubely.request.start";
pub(crate) const REQUEST_END: &str = "tubely.request.end";
pub(crate) const REQUEST_TIMINGS: &str = "tubely.request.timings";

fn describe_object_storage() {
    metrics::describe_histogram!(
        OBJECT_STORAGE_HEAD_OBJECT_REQUEST,
        "Timings for health-check HEAD requests against object storage"
    );
    metrics::describe_histogram!(
        OBJECT_STORAGE_CREATE_MULTIPART_REQUEST,
        "Timings for creating a multipart upload in object storage"
    );
    metrics::describe_histogram!(
        OBJECT_STORAGE_COMPLETE_MULTIPART_REQUEST,
        "Timings for completing a multipart upload to object storage"
    );
    metrics::describe_histogram!(
        OBJECT_STORAGE_DELETE_OBJECT_REQUEST,
        "Timings for requesting a video be deleted from object storage"
    );
}

pub(crate) const OBJECT_STORAGE_HEAD_OBJECT_REQUEST: &str =
    "tubely.object-storage.head-object-request";
pub(crate) const OBJECT_STORAGE_CREATE_MULTIPART_REQUEST: &str =
    "tubely.object-storage.create-multipart-request";
pub(crate) const OBJECT_STORAGE_COMPLETE_MULTIPART_REQUEST: &str =
    "tubely.object-storage.complete-multipart-request";
pub(crate) const OBJECT_STORAGE_DELETE_OBJECT_REQUEST: &str =
    "tubely.object-storage.delete-object-request";
