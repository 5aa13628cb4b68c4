mod local_store_cleanup;

pub(crate) use local_store_cleanup::LocalStoreCleanup;
