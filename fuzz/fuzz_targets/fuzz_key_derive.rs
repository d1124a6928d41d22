#![no_main]
use convo_store::history::key::{ConversationKey, KEY_LEN};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|ids: (&str, &str)| {
    let (user, discussion) = ids;
    let key = ConversationKey::derive(user, discussion);
    assert_eq!(key.as_str().len(), KEY_LEN);
    assert_eq!(key, ConversationKey::derive(user, discussion));
    if user != discussion {
        assert_ne!(key, ConversationKey::derive(discussion, user));
    }
});
